//! The UDP relay: one socket, one slot manager, one event loop.
//!
//! Inbound datagrams are decoded and routed into the [`SlotManager`]; every
//! message the engine emits goes through a channel-backed [`DatagramSink`]
//! and is flushed to the socket by the same loop.  The loop also ticks the
//! periodic surface refresh (the explicit staleness bound for coalesced
//! changes) and performs forced teardown of every slot on shutdown, flushing
//! the final zero frames before the socket closes.
//!
//! Everything runs in a single task: inbound handling, outbound flushing,
//! refresh, and device callbacks each run to completion before the next,
//! which is why the engine structures need no locking.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use padlink_core::{
    decode_message, encode_message, DatagramSink, DeviceCategory, SlotEvent, SlotManager,
    VirtualDevice, WireMessage,
};

use crate::config::AppConfig;

/// Largest datagram the relay will accept.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Error type for relay startup.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The configured bind address could not be parsed.
    #[error("invalid bind address {addr:?}: {source}")]
    InvalidBindAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// The UDP socket could not be bound.
    #[error("failed to bind relay socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

// ── Outbound sink ─────────────────────────────────────────────────────────────

/// [`DatagramSink`] implementation that encodes messages and queues the bytes
/// on an unbounded channel drained by the relay loop.
///
/// Fire-and-forget: when the relay has already stopped, queued messages are
/// dropped silently, which matches the transport guarantees the engine
/// assumes anyway.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>,
}

impl ChannelSink {
    /// Creates a sink and the receiving half the relay loop drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DatagramSink for ChannelSink {
    fn send(&self, dest: SocketAddr, msg: WireMessage) {
        let bytes = encode_message(&msg);
        if self.tx.send((dest, bytes)).is_err() {
            debug!(%dest, "outbound channel closed; datagram dropped");
        }
    }
}

// ── Application events ────────────────────────────────────────────────────────

/// Events surfaced by the engine's registered handlers, drained by the relay
/// loop.  Device callbacks run while the manager is borrowed, so anything
/// that needs to touch a device again (like key echo) goes through this
/// channel instead of re-entering the manager.
#[derive(Debug)]
enum AppEvent {
    Slot(SlotEvent),
    SurfaceKey { slot: usize, x: u16, y: u16, pressed: bool },
    RingDelta { slot: usize, ring: u8, delta: i32 },
    RingKey { slot: usize, ring: u8, pressed: bool },
}

// ── Relay ─────────────────────────────────────────────────────────────────────

/// The running host relay.
pub struct Relay {
    socket: UdpSocket,
    manager: SlotManager,
    outbound_rx: mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>,
    app_rx: mpsc::UnboundedReceiver<AppEvent>,
    app_tx: mpsc::UnboundedSender<AppEvent>,
    refresh_interval: Duration,
    key_echo: bool,
}

impl Relay {
    /// Binds the socket and wires the slot manager to it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] when the bind address is malformed or the
    /// socket cannot be bound.
    pub async fn bind(config: &AppConfig) -> Result<Self, RelayError> {
        let addr: SocketAddr = format!(
            "{}:{}",
            config.network.bind_address, config.network.listen_port
        )
        .parse()
        .map_err(|source| RelayError::InvalidBindAddress {
            addr: config.network.bind_address.clone(),
            source,
        })?;

        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| RelayError::BindFailed { addr, source })?;
        info!(%addr, "relay listening");

        let (sink, outbound_rx) = ChannelSink::new();
        let (app_tx, app_rx) = mpsc::unbounded_channel();

        let mut manager = SlotManager::new(config.pool_config(), Arc::new(sink));
        let slot_tx = app_tx.clone();
        manager.set_event_handler(move |event| {
            let _ = slot_tx.send(AppEvent::Slot(event));
        });

        Ok(Self {
            socket,
            manager,
            outbound_rx,
            app_rx,
            app_tx,
            refresh_interval: Duration::from_millis(config.surface.refresh_interval_ms.max(1)),
            key_echo: config.host.key_echo,
        })
    }

    /// The local address the relay is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs the event loop until ctrl-c, then tears down every slot and
    /// flushes the remaining outbound datagrams.
    pub async fn run(mut self) -> std::io::Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut refresh = tokio::time::interval(self.refresh_interval);
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, source)) => self.handle_datagram(&buf[..len], source),
                        Err(e) => warn!("socket receive error: {e}"),
                    }
                }
                Some((dest, bytes)) = self.outbound_rx.recv() => {
                    if let Err(e) = self.socket.send_to(&bytes, dest).await {
                        // Fire-and-forget: log and move on.
                        debug!(%dest, "send failed: {e}");
                    }
                }
                Some(event) = self.app_rx.recv() => {
                    self.handle_app_event(event);
                }
                _ = refresh.tick() => {
                    self.manager.refresh();
                }
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        warn!("ctrl-c handler failed: {e}");
                    }
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        self.manager.shutdown();
        self.flush_outbound().await;
        info!("relay stopped");
        Ok(())
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn handle_datagram(&mut self, bytes: &[u8], source: SocketAddr) {
        match decode_message(bytes) {
            Ok(msg) => {
                debug!(%source, path = msg.path(), "inbound");
                self.manager.handle_message(source, msg);
            }
            Err(e) => {
                // Malformed input is dropped with prior state unchanged; a
                // misbehaving client must never take the relay down.
                warn!(%source, "dropped malformed datagram: {e}");
            }
        }
    }

    fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Slot(SlotEvent::DeviceAdded { slot, category, client }) => {
                info!(slot, ?category, %client, "device added");
                self.attach_handlers(slot, category);
            }
            AppEvent::Slot(SlotEvent::DeviceRemoved { slot, category, client }) => {
                info!(slot, ?category, %client, "device removed");
            }
            AppEvent::SurfaceKey { slot, x, y, pressed } => {
                debug!(slot, x, y, pressed, "surface key");
                if self.key_echo {
                    if let Some(VirtualDevice::Surface(device)) = self.manager.device_mut(slot) {
                        device.led(x, y, if pressed { 15 } else { 0 });
                    }
                }
            }
            AppEvent::RingDelta { slot, ring, delta } => {
                debug!(slot, ring, delta, "encoder delta");
            }
            AppEvent::RingKey { slot, ring, pressed } => {
                debug!(slot, ring, pressed, "encoder key");
            }
        }
    }

    /// Registers the relay's own callbacks on a freshly connected device.
    /// An embedding application would hang its script layer here instead.
    fn attach_handlers(&mut self, slot: usize, category: DeviceCategory) {
        let Some(device) = self.manager.device_mut(slot) else {
            return;
        };
        match (category, device) {
            (DeviceCategory::Surface, VirtualDevice::Surface(device)) => {
                let tx = self.app_tx.clone();
                device.set_key_handler(move |x, y, pressed| {
                    let _ = tx.send(AppEvent::SurfaceKey { slot, x, y, pressed });
                });
            }
            (DeviceCategory::Ring, VirtualDevice::Ring(device)) => {
                let delta_tx = self.app_tx.clone();
                device.set_delta_handler(move |ring, delta| {
                    let _ = delta_tx.send(AppEvent::RingDelta { slot, ring, delta });
                });
                let key_tx = self.app_tx.clone();
                device.set_key_handler(move |ring, pressed| {
                    let _ = key_tx.send(AppEvent::RingKey { slot, ring, pressed });
                });
            }
            _ => {}
        }
    }

    /// Sends everything still queued on the outbound channel, in order.
    /// Used after teardown so the final zero frames and disconnect notices
    /// reach the clients.
    async fn flush_outbound(&mut self) {
        while let Ok((dest, bytes)) = self.outbound_rx.try_recv() {
            if let Err(e) = self.socket.send_to(&bytes, dest).await {
                debug!(%dest, "send failed during flush: {e}");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
