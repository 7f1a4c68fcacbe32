//! Fixed-pool slot manager: client sessions and device lifecycle.
//!
//! Each slot holds at most one connected [`VirtualDevice`].  A client is
//! identified by its datagram source address and can hold at most one slot
//! per device category at a time; reconnecting from the same address reuses
//! the existing slot (and its index) rather than consuming a free one.
//!
//! Slot lifecycle:
//!
//! ```text
//! Empty ──► Connected          (successful connect)
//!             │    ▲
//!             └────┘           (self-loop on reconnect: full re-transmit)
//!             │
//!             ▼
//!           Empty              (explicit disconnect, or forced teardown
//!                               when the whole pool shuts down)
//! ```
//!
//! Pool exhaustion is a normal outcome, reported to the client as a refusal
//! message – never an error on this side.  A misbehaving remote client must
//! not be able to crash the shared host runtime, so every inbound anomaly
//! degrades to "log and continue".

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::device::{DatagramSink, RingDevice, SurfaceDevice, VirtualDevice};
use crate::protocol::messages::{DeviceCategory, WireMessage};

/// Largest geometry a client may request in either dimension.
const MAX_REQUESTED_DIM: u16 = 256;

/// Default geometry for devices whose connect request omits dims.
#[derive(Debug, Clone, Copy)]
pub struct DeviceDefaults {
    /// Surface columns.
    pub surface_cols: u16,
    /// Surface rows.
    pub surface_rows: u16,
    /// Minimum interval between surface frame transmissions.
    pub refresh_interval: Duration,
    /// Ring count per ring device.
    pub rings: u8,
    /// LEDs per ring.
    pub leds_per_ring: u16,
}

impl Default for DeviceDefaults {
    fn default() -> Self {
        Self {
            surface_cols: 16,
            surface_rows: 8,
            refresh_interval: crate::device::surface::DEFAULT_REFRESH_INTERVAL,
            rings: 4,
            leds_per_ring: 64,
        }
    }
}

/// Pool sizing and device defaults, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Number of slots in the pool.
    pub slots: usize,
    /// Geometry used when a connect request does not negotiate its own.
    pub defaults: DeviceDefaults,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { slots: 4, defaults: DeviceDefaults::default() }
    }
}

/// Lifecycle notifications delivered to the registered event handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotEvent {
    /// A device was constructed and stored in `slot`.
    DeviceAdded {
        slot: usize,
        category: DeviceCategory,
        client: SocketAddr,
    },
    /// The device in `slot` was torn down and the slot emptied.
    DeviceRemoved {
        slot: usize,
        category: DeviceCategory,
        client: SocketAddr,
    },
}

/// Result of a connect request, for callers and tests; the wire response has
/// already been sent by the time this returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A free slot was allocated and a device constructed.
    Connected { slot: usize },
    /// The client already held a slot in this category; its state was
    /// re-pushed in full and the original dims re-acknowledged.
    Reconnected { slot: usize },
    /// The pool is exhausted.
    Refused,
}

/// One occupied pool entry.
struct SlotEntry {
    client: SocketAddr,
    device: VirtualDevice,
}

/// Handler type for [`SlotEvent`] notifications.
pub type SlotEventHandler = Box<dyn FnMut(SlotEvent) + Send>;

/// The fixed-pool session manager.
pub struct SlotManager {
    slots: Vec<Option<SlotEntry>>,
    defaults: DeviceDefaults,
    sink: Arc<dyn DatagramSink>,
    event_handler: Option<SlotEventHandler>,
}

impl SlotManager {
    /// Creates a manager with an empty pool.
    pub fn new(config: PoolConfig, sink: Arc<dyn DatagramSink>) -> Self {
        let mut slots = Vec::with_capacity(config.slots);
        slots.resize_with(config.slots, || None);
        Self {
            slots,
            defaults: config.defaults,
            sink,
            event_handler: None,
        }
    }

    /// Registers the lifecycle event handler.  Replaces any previous one.
    pub fn set_event_handler(&mut self, handler: impl FnMut(SlotEvent) + Send + 'static) {
        self.event_handler = Some(Box::new(handler));
    }

    /// Total number of slots in the pool.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of currently occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns the slot index held by `client` for `category`, if any.
    pub fn find_client_slot(&self, client: SocketAddr, category: DeviceCategory) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|e| e.client == client && e.device.category() == category)
        })
    }

    /// Mutable access to the device stored in `slot`, for the embedding
    /// application to draw on and register callbacks.
    pub fn device_mut(&mut self, slot: usize) -> Option<&mut VirtualDevice> {
        self.slots.get_mut(slot)?.as_mut().map(|e| &mut e.device)
    }

    /// Routes one decoded inbound message from `client`.
    ///
    /// Unroutable messages (no slot for the sender, or a message this side
    /// only ever emits) are logged and dropped with prior state unchanged.
    pub fn handle_message(&mut self, client: SocketAddr, msg: WireMessage) {
        match msg {
            WireMessage::ConnectRequest { id, category, dims } => {
                debug!(%client, id, ?category, "connect request");
                self.connect(client, category, dims);
            }
            WireMessage::DisconnectRequest { id } => match id {
                Some(raw) => match usize::try_from(raw) {
                    Ok(slot) => self.disconnect(client, Some(slot)),
                    Err(_) => debug!(%client, raw, "ignored disconnect with invalid slot id"),
                },
                None => self.disconnect(client, None),
            },
            WireMessage::SurfaceKey { x, y, pressed } => {
                match self.find_client_slot(client, DeviceCategory::Surface) {
                    Some(slot) => {
                        if let Some(VirtualDevice::Surface(device)) = self.device_mut(slot) {
                            device.handle_key(x, y, pressed);
                        }
                    }
                    None => debug!(%client, "surface key event from client without a slot"),
                }
            }
            WireMessage::RingDelta { ring, delta } => {
                match self.find_client_slot(client, DeviceCategory::Ring) {
                    Some(slot) => {
                        if let Some(VirtualDevice::Ring(device)) = self.device_mut(slot) {
                            device.handle_delta(ring, delta);
                        }
                    }
                    None => debug!(%client, "encoder delta from client without a slot"),
                }
            }
            WireMessage::RingKey { ring, pressed } => {
                match self.find_client_slot(client, DeviceCategory::Ring) {
                    Some(slot) => {
                        if let Some(VirtualDevice::Ring(device)) = self.device_mut(slot) {
                            device.handle_key(ring, pressed);
                        }
                    }
                    None => debug!(%client, "encoder key event from client without a slot"),
                }
            }
            other => {
                warn!(%client, path = other.path(), "dropped outbound-only message from client");
            }
        }
    }

    /// Handles a connect request: reconnect, allocate, or refuse.
    pub fn connect(
        &mut self,
        client: SocketAddr,
        category: DeviceCategory,
        dims: Option<(u16, u16)>,
    ) -> ConnectOutcome {
        // Same address, same category: a reconnect.  The slot index stays
        // stable, no free slot is consumed, and the remote gets its state
        // back in full (its display may have been cleared or gone stale).
        if let Some(slot) = self.find_client_slot(client, category) {
            if let Some(entry) = self.slots[slot].as_mut() {
                let (cols, rows) = entry.device.negotiated_dims();
                entry.device.force_frame();
                self.sink.send(
                    client,
                    WireMessage::ConnectAck { id: slot as i32, category, cols, rows },
                );
            }
            info!(%client, slot, ?category, "reconnected");
            return ConnectOutcome::Reconnected { slot };
        }

        let Some(slot) = self.find_free_slot() else {
            // A full pool is a normal outcome; the client retries or shows a
            // "no space" state.
            warn!(%client, ?category, "connect refused: pool exhausted");
            self.sink.send(client, WireMessage::ConnectRefuse);
            return ConnectOutcome::Refused;
        };

        let device = self.build_device(client, category, dims);
        let (cols, rows) = device.negotiated_dims();
        self.slots[slot] = Some(SlotEntry { client, device });
        self.sink.send(
            client,
            WireMessage::ConnectAck { id: slot as i32, category, cols, rows },
        );
        info!(%client, slot, ?category, cols, rows, "connected");
        self.emit(SlotEvent::DeviceAdded { slot, category, client });
        ConnectOutcome::Connected { slot }
    }

    /// Tears down `client`'s slots.  With a slot id, only that slot and only
    /// when the caller owns it; without, every slot the caller holds.
    pub fn disconnect(&mut self, client: SocketAddr, slot_id: Option<usize>) {
        match slot_id {
            Some(slot) => {
                let owned = self
                    .slots
                    .get(slot)
                    .and_then(|s| s.as_ref())
                    .is_some_and(|e| e.client == client);
                if owned {
                    self.teardown_slot(slot);
                } else {
                    debug!(%client, slot, "ignored disconnect for slot not owned by sender");
                }
            }
            None => {
                for slot in 0..self.slots.len() {
                    let owned = self.slots[slot].as_ref().is_some_and(|e| e.client == client);
                    if owned {
                        self.teardown_slot(slot);
                    }
                }
            }
        }
    }

    /// Drives the rate-limited refresh of every connected surface device.
    pub fn refresh(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            if let VirtualDevice::Surface(device) = &mut slot.device {
                device.refresh();
            }
        }
    }

    /// Forced teardown of every occupied slot, in slot order.  Each device
    /// performs its forced zero transmit before the slot is freed.
    pub fn shutdown(&mut self) {
        for slot in 0..self.slots.len() {
            if self.slots[slot].is_some() {
                self.teardown_slot(slot);
            }
        }
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    /// First empty slot, if any.
    fn find_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    /// Constructs the device for a fresh connect.  Requested dims are clamped
    /// to sane bounds; absent dims fall back to the configured defaults.
    fn build_device(
        &self,
        client: SocketAddr,
        category: DeviceCategory,
        dims: Option<(u16, u16)>,
    ) -> VirtualDevice {
        match category {
            DeviceCategory::Surface => {
                let (cols, rows) = dims
                    .map(|(c, r)| (clamp_dim(c), clamp_dim(r)))
                    .unwrap_or((self.defaults.surface_cols, self.defaults.surface_rows));
                VirtualDevice::Surface(SurfaceDevice::new(
                    cols,
                    rows,
                    client,
                    Arc::clone(&self.sink),
                    self.defaults.refresh_interval,
                ))
            }
            DeviceCategory::Ring => {
                let (rings, leds) = dims
                    .map(|(r, l)| (clamp_dim(r).min(u8::MAX as u16) as u8, clamp_dim(l)))
                    .unwrap_or((self.defaults.rings, self.defaults.leds_per_ring));
                VirtualDevice::Ring(RingDevice::new(rings, leds, client, Arc::clone(&self.sink)))
            }
        }
    }

    /// Device cleanup, disconnect notice, slot release, removal event.
    fn teardown_slot(&mut self, slot: usize) {
        let Some(mut entry) = self.slots.get_mut(slot).and_then(Option::take) else {
            return;
        };
        let category = entry.device.category();
        entry.device.shutdown();
        self.sink.send(entry.client, WireMessage::DisconnectNotice { id: slot as i32 });
        info!(client = %entry.client, slot, ?category, "disconnected");
        self.emit(SlotEvent::DeviceRemoved { slot, category, client: entry.client });
    }

    fn emit(&mut self, event: SlotEvent) {
        if let Some(handler) = self.event_handler.as_mut() {
            handler(event);
        }
    }
}

/// Clamps a requested dimension into 1..=MAX_REQUESTED_DIM.
fn clamp_dim(value: u16) -> u16 {
    value.clamp(1, MAX_REQUESTED_DIM)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
