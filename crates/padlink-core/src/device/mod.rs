//! Virtual device implementations.
//!
//! A virtual device owns the packed state for one remote control surface and
//! turns application-facing mutations into wire messages.  Two families
//! exist, selected once at connect time:
//!
//! - **`surface`** – a 2D button/LED grid with rotation support and a
//!   rate-limited, coalescing refresh cycle.
//! - **`ring`** – a set of circular LED rings with rotary encoders; every
//!   mutation transmits immediately for tight rotation-feedback latency.
//!
//! Devices never touch a socket.  They hand finished [`WireMessage`]s to a
//! [`DatagramSink`], which the host implements over UDP and tests implement
//! as recorders.

use std::net::SocketAddr;

use crate::protocol::messages::{DeviceCategory, WireMessage};

pub mod ring;
pub mod surface;

pub use ring::RingDevice;
pub use surface::SurfaceDevice;

/// Outbound transport seam.
///
/// Implementations must be fire-and-forget: delivery failure is invisible to
/// the devices (the transport may log it).  `Send + Sync` so a single sink
/// can be shared by every device in the pool.
pub trait DatagramSink: Send + Sync {
    /// Queues one message for delivery to `dest`.
    fn send(&self, dest: SocketAddr, msg: WireMessage);
}

/// A connected device instance: one of the two families, chosen at connect
/// time and fixed for the life of the slot.
pub enum VirtualDevice {
    Surface(SurfaceDevice),
    Ring(RingDevice),
}

impl VirtualDevice {
    /// Returns which family this device belongs to.
    pub fn category(&self) -> DeviceCategory {
        match self {
            VirtualDevice::Surface(_) => DeviceCategory::Surface,
            VirtualDevice::Ring(_) => DeviceCategory::Ring,
        }
    }

    /// Returns the negotiated geometry as reported in connect handshakes:
    /// (cols, rows) for surfaces, (rings, leds per ring) for rings.
    pub fn negotiated_dims(&self) -> (u16, u16) {
        match self {
            VirtualDevice::Surface(d) => (d.cols(), d.rows()),
            VirtualDevice::Ring(d) => (d.rings() as u16, d.leds_per_ring()),
        }
    }

    /// Pushes the complete current state to the remote, unconditionally.
    /// Used on reconnect, when the remote's display may be stale or blank.
    pub fn force_frame(&mut self) {
        match self {
            VirtualDevice::Surface(d) => d.force_frame(),
            VirtualDevice::Ring(d) => d.force_frame(),
        }
    }

    /// Blanks the device and pushes the all-zero state: the forced,
    /// unconditional transmit that precedes freeing a slot.
    pub fn shutdown(&mut self) {
        match self {
            VirtualDevice::Surface(d) => d.shutdown(),
            VirtualDevice::Ring(d) => d.shutdown(),
        }
    }
}
