//! Integration tests for the session lifecycle, driven the way the relay
//! drives it: raw datagrams are decoded and fed to the slot manager, and the
//! assertions run against the messages the engine hands the outbound sink.
//!
//! Covered flows:
//!
//! - The happy path: connect, draw, refresh, disconnect, with the forced
//!   zero frame and disconnect notice in order.
//! - Pool exhaustion refusal and reconnect slot stability.
//! - Input routing from wire events through the device transforms into
//!   application callbacks.
//! - Whole-pool shutdown.
//!
//! One test uses `mockall` to place exact expectations on the
//! [`DatagramSink`] seam; the rest use a recording sink, which reads better
//! for multi-message orderings.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use padlink_core::{
    decode_message, encode_message, ConnectOutcome, DatagramSink, DeviceCategory, DeviceDefaults,
    PoolConfig, SlotManager, VirtualDevice, WireMessage,
};

// ── Test doubles ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(SocketAddr, WireMessage)>>,
}

impl DatagramSink for RecordingSink {
    fn send(&self, dest: SocketAddr, msg: WireMessage) {
        self.sent.lock().unwrap().push((dest, msg));
    }
}

impl RecordingSink {
    fn messages_for(&self, dest: SocketAddr) -> Vec<WireMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| *d == dest)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

mockall::mock! {
    Sink {}

    impl DatagramSink for Sink {
        fn send(&self, dest: SocketAddr, msg: WireMessage);
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn addr(port: u16) -> SocketAddr {
    format!("192.168.7.2:{port}").parse().unwrap()
}

fn pool(slots: usize) -> PoolConfig {
    PoolConfig {
        slots,
        defaults: DeviceDefaults {
            surface_cols: 16,
            surface_rows: 8,
            // Unthrottled so tests can refresh back to back.
            refresh_interval: Duration::ZERO,
            rings: 2,
            leds_per_ring: 64,
        },
    }
}

fn make_manager(slots: usize) -> (SlotManager, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    (SlotManager::new(pool(slots), Arc::clone(&sink) as _), sink)
}

/// Feeds a message through its wire form, as the relay does.
fn deliver(mgr: &mut SlotManager, from: SocketAddr, msg: &WireMessage) {
    let decoded = decode_message(&encode_message(msg)).expect("wire round trip");
    mgr.handle_message(from, decoded);
}

// ── Session lifecycle ─────────────────────────────────────────────────────────

#[test]
fn test_full_surface_session_from_connect_to_disconnect() {
    let (mut mgr, sink) = make_manager(4);
    let client = addr(7000);

    // Connect over the wire.
    deliver(
        &mut mgr,
        client,
        &WireMessage::ConnectRequest { id: 1, category: DeviceCategory::Surface, dims: Some((8, 8)) },
    );
    assert_eq!(
        sink.messages_for(client),
        vec![WireMessage::ConnectAck { id: 0, category: DeviceCategory::Surface, cols: 8, rows: 8 }]
    );
    sink.clear();

    // Draw and refresh.
    if let Some(VirtualDevice::Surface(device)) = mgr.device_mut(0) {
        device.led(1, 1, 15);
        device.led(8, 8, 7);
    }
    mgr.refresh();
    let frames = sink.messages_for(client);
    assert_eq!(frames.len(), 1);
    match &frames[0] {
        WireMessage::SurfaceFrame { hex } => {
            assert_eq!(hex.len(), 64);
            assert!(hex.starts_with('F'));
            assert!(hex.ends_with('7'));
        }
        other => panic!("expected a frame push, got {other:?}"),
    }
    sink.clear();

    // Voluntary disconnect: forced zero frame, then the notice.
    deliver(&mut mgr, client, &WireMessage::DisconnectRequest { id: None });
    let teardown = sink.messages_for(client);
    assert_eq!(teardown.len(), 2);
    assert_eq!(teardown[0], WireMessage::SurfaceFrame { hex: "0".repeat(64) });
    assert_eq!(teardown[1], WireMessage::DisconnectNotice { id: 0 });
    assert_eq!(mgr.occupied(), 0);
}

#[test]
fn test_pool_exhaustion_refuses_fifth_client_but_reconnects_fourth() {
    let (mut mgr, sink) = make_manager(4);
    for i in 0..4 {
        deliver(
            &mut mgr,
            addr(7100 + i),
            &WireMessage::ConnectRequest { id: i as i32, category: DeviceCategory::Surface, dims: None },
        );
    }
    assert_eq!(mgr.occupied(), 4);

    let latecomer = addr(7199);
    deliver(
        &mut mgr,
        latecomer,
        &WireMessage::ConnectRequest { id: 9, category: DeviceCategory::Surface, dims: None },
    );
    assert_eq!(sink.messages_for(latecomer), vec![WireMessage::ConnectRefuse]);

    // The fourth client reconnects: same slot id in the ack, no new slot.
    sink.clear();
    let fourth = addr(7103);
    deliver(
        &mut mgr,
        fourth,
        &WireMessage::ConnectRequest { id: 3, category: DeviceCategory::Surface, dims: None },
    );
    let messages = sink.messages_for(fourth);
    assert!(
        matches!(messages[0], WireMessage::SurfaceFrame { .. }),
        "reconnect re-pushes state before the ack"
    );
    assert_eq!(
        messages[1],
        WireMessage::ConnectAck { id: 3, category: DeviceCategory::Surface, cols: 16, rows: 8 }
    );
    assert_eq!(mgr.occupied(), 4);
}

#[test]
fn test_slot_freed_by_disconnect_is_reused_by_next_client() {
    let (mut mgr, _sink) = make_manager(2);
    let first = addr(7200);
    let second = addr(7201);
    mgr.connect(first, DeviceCategory::Surface, None);
    mgr.connect(second, DeviceCategory::Surface, None);
    mgr.disconnect(first, None);

    let third = addr(7202);
    assert_eq!(
        mgr.connect(third, DeviceCategory::Surface, None),
        ConnectOutcome::Connected { slot: 0 }
    );
    assert_eq!(mgr.find_client_slot(second, DeviceCategory::Surface), Some(1));
}

// ── Input routing ─────────────────────────────────────────────────────────────

#[test]
fn test_surface_key_event_reaches_callback_in_logical_coordinates() {
    let (mut mgr, _sink) = make_manager(2);
    let client = addr(7300);
    mgr.connect(client, DeviceCategory::Surface, None);

    let presses: Arc<Mutex<Vec<(u16, u16, bool)>>> = Arc::default();
    let record = Arc::clone(&presses);
    if let Some(VirtualDevice::Surface(device)) = mgr.device_mut(0) {
        device.set_rotation(2);
        device.set_key_handler(move |x, y, pressed| {
            record.lock().unwrap().push((x, y, pressed));
        });
    }

    // Physical (0,0) on the wire is logical (16,8) under a half turn.
    deliver(&mut mgr, client, &WireMessage::SurfaceKey { x: 0, y: 0, pressed: true });
    deliver(&mut mgr, client, &WireMessage::SurfaceKey { x: 0, y: 0, pressed: false });

    assert_eq!(presses.lock().unwrap().as_slice(), &[(16, 8, true), (16, 8, false)]);
}

#[test]
fn test_ring_events_reach_callbacks_with_one_based_rings() {
    let (mut mgr, _sink) = make_manager(2);
    let client = addr(7301);
    mgr.connect(client, DeviceCategory::Ring, None);

    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    if let Some(VirtualDevice::Ring(device)) = mgr.device_mut(0) {
        let deltas = Arc::clone(&seen);
        device.set_delta_handler(move |ring, delta| {
            deltas.lock().unwrap().push(format!("delta {ring} {delta}"));
        });
        let keys = Arc::clone(&seen);
        device.set_key_handler(move |ring, pressed| {
            keys.lock().unwrap().push(format!("key {ring} {pressed}"));
        });
    }

    deliver(&mut mgr, client, &WireMessage::RingDelta { ring: 0, delta: 2 });
    deliver(&mut mgr, client, &WireMessage::RingDelta { ring: 1, delta: -3 });
    deliver(&mut mgr, client, &WireMessage::RingKey { ring: 1, pressed: true });

    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &["delta 1 2".to_string(), "delta 2 -3".to_string(), "key 2 true".to_string()]
    );
}

#[test]
fn test_events_from_strangers_are_ignored() {
    let (mut mgr, sink) = make_manager(2);
    let client = addr(7302);
    mgr.connect(client, DeviceCategory::Surface, None);
    sink.clear();

    let stranger = addr(7399);
    deliver(&mut mgr, stranger, &WireMessage::SurfaceKey { x: 0, y: 0, pressed: true });
    deliver(&mut mgr, stranger, &WireMessage::RingDelta { ring: 0, delta: 1 });
    deliver(&mut mgr, stranger, &WireMessage::DisconnectRequest { id: Some(0) });

    assert_eq!(mgr.occupied(), 1, "a stranger must not free someone else's slot");
    assert!(sink.sent.lock().unwrap().is_empty());
}

// ── Ring transmit path ────────────────────────────────────────────────────────

#[test]
fn test_ring_mutations_transmit_immediately_without_refresh() {
    let (mut mgr, sink) = make_manager(1);
    let client = addr(7400);
    mgr.connect(client, DeviceCategory::Ring, None);
    sink.clear();

    if let Some(VirtualDevice::Ring(device)) = mgr.device_mut(0) {
        device.led(1, 1, 15);
        device.all(3);
    }

    let messages = sink.messages_for(client);
    assert_eq!(messages[0], WireMessage::RingSet { ring: 0, x: 0, level: 15 });
    assert_eq!(messages[1], WireMessage::RingAll { ring: 0, level: 3 });
    assert_eq!(messages[2], WireMessage::RingAll { ring: 1, level: 3 });
    assert_eq!(messages.len(), 3, "two rings configured, one ring-all each");
}

// ── Shutdown ──────────────────────────────────────────────────────────────────

#[test]
fn test_shutdown_tears_down_mixed_pool_in_slot_order() {
    let (mut mgr, sink) = make_manager(3);
    let grid_client = addr(7500);
    let ring_client = addr(7501);
    mgr.connect(grid_client, DeviceCategory::Surface, Some((4, 4)));
    mgr.connect(ring_client, DeviceCategory::Ring, None);
    sink.clear();

    mgr.shutdown();
    assert_eq!(mgr.occupied(), 0);

    let to_grid = sink.messages_for(grid_client);
    assert_eq!(to_grid[0], WireMessage::SurfaceFrame { hex: "0".repeat(16) });
    assert_eq!(to_grid[1], WireMessage::DisconnectNotice { id: 0 });

    let to_ring = sink.messages_for(ring_client);
    assert_eq!(to_ring[0], WireMessage::RingAll { ring: 0, level: 0 });
    assert_eq!(to_ring[1], WireMessage::RingAll { ring: 1, level: 0 });
    assert_eq!(to_ring[2], WireMessage::DisconnectNotice { id: 1 });
}

// ── Mock-based expectations ───────────────────────────────────────────────────

#[test]
fn test_connect_sends_exactly_one_ack_with_negotiated_dims() {
    let client = addr(7600);
    let mut mock = MockSink::new();
    mock.expect_send()
        .withf(move |dest, msg| {
            *dest == client
                && *msg
                    == WireMessage::ConnectAck {
                        id: 0,
                        category: DeviceCategory::Surface,
                        cols: 12,
                        rows: 6,
                    }
        })
        .times(1)
        .return_const(());

    let mut mgr = SlotManager::new(pool(1), Arc::new(mock));
    let outcome = mgr.connect(client, DeviceCategory::Surface, Some((12, 6)));
    assert_eq!(outcome, ConnectOutcome::Connected { slot: 0 });
}

#[test]
fn test_refused_connect_sends_only_the_refusal() {
    let first = addr(7601);
    let second = addr(7602);
    let mut mock = MockSink::new();
    mock.expect_send()
        .withf(move |dest, msg| *dest == first && matches!(msg, WireMessage::ConnectAck { .. }))
        .times(1)
        .return_const(());
    mock.expect_send()
        .withf(move |dest, msg| *dest == second && *msg == WireMessage::ConnectRefuse)
        .times(1)
        .return_const(());

    let mut mgr = SlotManager::new(pool(1), Arc::new(mock));
    mgr.connect(first, DeviceCategory::Surface, None);
    assert_eq!(mgr.connect(second, DeviceCategory::Surface, None), ConnectOutcome::Refused);
}
