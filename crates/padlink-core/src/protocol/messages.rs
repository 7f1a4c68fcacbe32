//! All Padlink wire message types.
//!
//! The wire protocol is a set of path-addressed, typed-argument datagrams:
//! every message is one datagram carrying a path string (which selects the
//! message) and a short list of tagged arguments.  The concrete byte framing
//! lives in [`crate::protocol::codec`].
//!
//! All coordinates, ring numbers, and indices on the wire are 0-based.  The
//! application-facing device API is 1-based; conversion happens inside the
//! devices and the slot manager, never here.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte, first byte of every datagram.
pub const PROTOCOL_VERSION: u8 = 0x01;

// ── Message paths ─────────────────────────────────────────────────────────────

pub const PATH_CONNECT: &str = "/link/connect";
pub const PATH_CONNECTED: &str = "/link/connected";
pub const PATH_REFUSED: &str = "/link/refused";
pub const PATH_DISCONNECT: &str = "/link/disconnect";
pub const PATH_DISCONNECTED: &str = "/link/disconnected";
pub const PATH_SURFACE_FRAME: &str = "/surface/frame";
pub const PATH_SURFACE_KEY: &str = "/surface/key";
pub const PATH_RING_SET: &str = "/ring/set";
pub const PATH_RING_ALL: &str = "/ring/all";
pub const PATH_RING_MAP: &str = "/ring/map";
pub const PATH_RING_DELTA: &str = "/ring/delta";
pub const PATH_RING_KEY: &str = "/ring/key";

// ── Device category ───────────────────────────────────────────────────────────

/// The two virtual device families a client can request a slot for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceCategory {
    /// 2D button/LED grid.
    Surface,
    /// Set of circular LED rings with rotary encoders.
    Ring,
}

impl DeviceCategory {
    /// The category's wire spelling, carried as a string argument.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceCategory::Surface => "surface",
            DeviceCategory::Ring => "ring",
        }
    }

    /// Parses the wire spelling; anything else is rejected.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "surface" => Some(DeviceCategory::Surface),
            "ring" => Some(DeviceCategory::Ring),
            _ => None,
        }
    }
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid Padlink messages, discriminated by datagram path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// `/link/connect` (in): a client requests a slot.  `id` is the client's
    /// self-reported instance id (informational only – the session identity
    /// is the datagram source address).  `dims` optionally requests a
    /// geometry: (cols, rows) for surfaces, (rings, leds per ring) for rings.
    ConnectRequest {
        id: i32,
        category: DeviceCategory,
        dims: Option<(u16, u16)>,
    },

    /// `/link/connected` (out): slot granted.  `id` is the slot index; the
    /// dims are the negotiated geometry.
    ConnectAck {
        id: i32,
        category: DeviceCategory,
        cols: u16,
        rows: u16,
    },

    /// `/link/refused` (out): the pool is exhausted.  A normal outcome, not
    /// an error – the client retries or surfaces a "no space" state.
    ConnectRefuse,

    /// `/link/disconnect` (in): voluntary teardown.  With an id, only that
    /// slot; without, every slot the sender owns.
    DisconnectRequest { id: Option<i32> },

    /// `/link/disconnected` (out): the slot with this index was freed.
    DisconnectNotice { id: i32 },

    /// `/surface/frame` (out): full-frame push, one hex digit per element in
    /// physical index order.
    SurfaceFrame { hex: String },

    /// `/surface/key` (in): button transition at a 0-based physical
    /// coordinate; `pressed` is wire state 1.
    SurfaceKey { x: u16, y: u16, pressed: bool },

    /// `/ring/set` (out): one LED on one ring, all 0-based.
    RingSet { ring: u8, x: u16, level: u8 },

    /// `/ring/all` (out): every LED on one ring to `level`.
    RingAll { ring: u8, level: u8 },

    /// `/ring/map` (out): the whole ring as an array of levels.
    RingMap { ring: u8, levels: Vec<u8> },

    /// `/ring/delta` (in): signed encoder rotation on a 0-based ring.
    RingDelta { ring: u8, delta: i32 },

    /// `/ring/key` (in): encoder button transition on a 0-based ring.
    RingKey { ring: u8, pressed: bool },
}

impl WireMessage {
    /// Returns the datagram path for this message.
    pub fn path(&self) -> &'static str {
        match self {
            WireMessage::ConnectRequest { .. } => PATH_CONNECT,
            WireMessage::ConnectAck { .. } => PATH_CONNECTED,
            WireMessage::ConnectRefuse => PATH_REFUSED,
            WireMessage::DisconnectRequest { .. } => PATH_DISCONNECT,
            WireMessage::DisconnectNotice { .. } => PATH_DISCONNECTED,
            WireMessage::SurfaceFrame { .. } => PATH_SURFACE_FRAME,
            WireMessage::SurfaceKey { .. } => PATH_SURFACE_KEY,
            WireMessage::RingSet { .. } => PATH_RING_SET,
            WireMessage::RingAll { .. } => PATH_RING_ALL,
            WireMessage::RingMap { .. } => PATH_RING_MAP,
            WireMessage::RingDelta { .. } => PATH_RING_DELTA,
            WireMessage::RingKey { .. } => PATH_RING_KEY,
        }
    }
}
