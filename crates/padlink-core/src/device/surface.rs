//! Virtual 2D button/LED surface device.
//!
//! The surface buffers brightness writes in a [`PackedFrame`] and pushes them
//! with a rate-limited, coalescing [`refresh`](SurfaceDevice::refresh): calls
//! that arrive faster than the minimum interval are no-ops, and the next
//! naturally occurring call picks up the accumulated dirty state.  There is
//! no queued retry and no background timer; if the application stops calling
//! `refresh()`, pending changes stay buffered indefinitely.
//!
//! Rotation is applied on this side of the wire: `led` maps logical
//! coordinates to physical indices before they reach the frame, and
//! [`handle_key`](SurfaceDevice::handle_key) applies the inverse transform to
//! physical press coordinates before the application callback sees them.
//! The remote client only ever deals in physical space.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::device::DatagramSink;
use crate::domain::frame::PackedFrame;
use crate::domain::rotation::Rotation;
use crate::protocol::messages::WireMessage;

/// Default minimum interval between frame transmissions (~30 Hz).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(33);

/// Callback invoked for button transitions, in 1-based logical coordinates.
pub type KeyHandler = Box<dyn FnMut(u16, u16, bool) + Send>;

/// A virtual button/LED grid bound to one remote client.
pub struct SurfaceDevice {
    cols: u16,
    rows: u16,
    rotation: Rotation,
    frame: PackedFrame,
    client: SocketAddr,
    sink: Arc<dyn DatagramSink>,
    key_handler: Option<KeyHandler>,
    min_refresh_interval: Duration,
    last_sent: Option<Instant>,
}

impl SurfaceDevice {
    /// Creates a zeroed surface of physical extent `cols × rows` for the
    /// given client.
    pub fn new(
        cols: u16,
        rows: u16,
        client: SocketAddr,
        sink: Arc<dyn DatagramSink>,
        min_refresh_interval: Duration,
    ) -> Self {
        Self {
            cols,
            rows,
            rotation: Rotation::R0,
            frame: PackedFrame::new(cols as usize * rows as usize),
            client,
            sink,
            key_handler: None,
            min_refresh_interval,
            last_sent: None,
        }
    }

    /// Physical column count.
    pub fn cols(&self) -> u16 {
        self.cols
    }

    /// Physical row count.
    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// The client endpoint this device transmits to.
    pub fn client(&self) -> SocketAddr {
        self.client
    }

    /// Current rotation.
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// The extent the application addresses, which swaps columns and rows
    /// when the rotation is an odd quarter turn.
    pub fn logical_extent(&self) -> (u16, u16) {
        self.rotation.logical_extent(self.cols, self.rows)
    }

    /// Registers the button callback.  Replaces any previous handler.
    pub fn set_key_handler(&mut self, handler: impl FnMut(u16, u16, bool) + Send + 'static) {
        self.key_handler = Some(Box::new(handler));
    }

    /// Sets the LED at 1-based logical `(x, y)` to `level` (clamped 0..=15).
    ///
    /// Coordinates outside the current logical extent are silently ignored,
    /// mirroring hardware that drops out-of-range writes.
    pub fn led(&mut self, x: u16, y: u16, level: u8) {
        let (lw, lh) = self.logical_extent();
        if x == 0 || y == 0 || x > lw || y > lh {
            return;
        }
        let (px, py) = self.rotation.to_physical(self.cols, self.rows, x, y);
        let index = self.physical_index(px, py);
        self.frame.set(index, level);
    }

    /// Sets every LED to `level` and marks the whole frame dirty, forcing the
    /// next refresh to transmit even when values did not change.
    pub fn all(&mut self, level: u8) {
        self.frame.set_all(level);
    }

    /// Reads back the level at a 1-based logical coordinate (0 out of range).
    pub fn led_level(&self, x: u16, y: u16) -> u8 {
        let (lw, lh) = self.logical_extent();
        if x == 0 || y == 0 || x > lw || y > lh {
            return 0;
        }
        let (px, py) = self.rotation.to_physical(self.cols, self.rows, x, y);
        self.frame.get(self.physical_index(px, py))
    }

    /// Changes the rotation.  Returns `false` (no state change) for indices
    /// outside 0..=3.  A valid change forces an immediate full transmit: the
    /// logical→physical mapping moved even though the physical payload may be
    /// unchanged, and the remote side never needs rotation awareness.
    pub fn set_rotation(&mut self, index: u8) -> bool {
        let Some(rotation) = Rotation::from_index(index) else {
            debug!(index, "rejected invalid rotation");
            return false;
        };
        self.rotation = rotation;
        self.frame.mark_all_dirty();
        self.transmit_full();
        true
    }

    /// Rate-limited, coalescing transmit of accumulated changes.
    ///
    /// No-op when nothing is dirty or when called again inside the minimum
    /// interval – a rate-limited call must not clear dirty state, so the next
    /// allowed call still sees everything that accumulated.  Otherwise the
    /// full frame is serialized to hex, one update is emitted, the state is
    /// committed, and the dirty bits are cleared.
    pub fn refresh(&mut self) {
        if !self.frame.has_dirty() {
            return;
        }
        if let Some(last) = self.last_sent {
            if last.elapsed() < self.min_refresh_interval {
                return;
            }
        }
        self.transmit_full();
    }

    /// Unconditional full-frame push, bypassing the rate limit.  Used for
    /// reconnects, rotation changes, and teardown.
    pub fn force_frame(&mut self) {
        self.frame.mark_all_dirty();
        self.transmit_full();
    }

    /// Blanks the surface and pushes the all-zero frame.
    pub fn shutdown(&mut self) {
        self.frame.clear();
        self.transmit_full();
    }

    /// Routes a remote button transition at 0-based physical `(px, py)`
    /// through the inverse rotation transform and into the key callback.
    /// Out-of-range coordinates are dropped; a missing callback is a no-op.
    pub fn handle_key(&mut self, px: u16, py: u16, pressed: bool) {
        if px >= self.cols || py >= self.rows {
            debug!(px, py, "dropped out-of-range surface key event");
            return;
        }
        let (lx, ly) = self.rotation.to_logical(self.cols, self.rows, px + 1, py + 1);
        if let Some(handler) = self.key_handler.as_mut() {
            handler(lx, ly, pressed);
        }
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    /// Row-major frame index of a 1-based physical coordinate.
    fn physical_index(&self, px: u16, py: u16) -> usize {
        (py as usize - 1) * self.cols as usize + (px as usize - 1)
    }

    fn transmit_full(&mut self) {
        self.sink.send(
            self.client,
            WireMessage::SurfaceFrame { hex: self.frame.to_hex_string() },
        );
        self.frame.commit();
        self.frame.clear_dirty();
        self.last_sent = Some(Instant::now());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every message handed to the sink.
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
        fn frames(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(_, m)| match m {
                    WireMessage::SurfaceFrame { hex } => Some(hex.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    fn client_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn make_device(interval: Duration) -> (SurfaceDevice, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let device = SurfaceDevice::new(16, 8, client_addr(), Arc::clone(&sink) as _, interval);
        (device, sink)
    }

    /// A device with a zero rate limit so every refresh is allowed through.
    fn make_unthrottled() -> (SurfaceDevice, Arc<RecordingSink>) {
        make_device(Duration::ZERO)
    }

    #[test]
    fn test_led_then_refresh_transmits_hex_frame() {
        let (mut device, sink) = make_unthrottled();
        device.led(1, 1, 15);
        device.refresh();

        let frames = sink.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 128);
        assert!(frames[0].starts_with('F'));
        assert_eq!(frames[0][1..], "0".repeat(127));
    }

    #[test]
    fn test_refresh_with_nothing_dirty_is_noop() {
        let (mut device, sink) = make_unthrottled();
        device.refresh();
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn test_refresh_clears_dirty_and_commits() {
        let (mut device, sink) = make_unthrottled();
        device.led(3, 2, 9);
        device.refresh();
        // A second refresh with no further writes transmits nothing.
        device.refresh();
        assert_eq!(sink.frames().len(), 1);
    }

    #[test]
    fn test_refresh_rate_limit_coalesces_and_preserves_dirty() {
        // Two refresh() calls inside the rate-limit window produce exactly
        // one transmit, and the second call leaves the dirty state alone.
        let (mut device, sink) = make_device(Duration::from_secs(3600));
        device.led(1, 1, 15);
        device.refresh();
        assert_eq!(sink.frames().len(), 1);

        device.led(2, 1, 7);
        device.refresh(); // inside the window: no-op
        assert_eq!(sink.frames().len(), 1);

        // The change stays buffered for the next allowed refresh.
        assert_eq!(device.led_level(2, 1), 7);
    }

    #[test]
    fn test_led_out_of_range_is_silently_ignored() {
        let (mut device, sink) = make_unthrottled();
        device.led(0, 1, 15);
        device.led(17, 1, 15);
        device.led(1, 9, 15);
        device.refresh();
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn test_all_marks_dirty_and_transmits_even_when_unchanged() {
        let (mut device, sink) = make_unthrottled();
        // Frame is already all-zero; all(0) still forces a push.
        device.all(0);
        device.refresh();
        assert_eq!(sink.frames().len(), 1);
        assert_eq!(sink.frames()[0], "0".repeat(128));
    }

    #[test]
    fn test_rotation_swaps_logical_extent() {
        let (mut device, _sink) = make_unthrottled();
        assert_eq!(device.logical_extent(), (16, 8));
        assert!(device.set_rotation(1));
        assert_eq!(device.logical_extent(), (8, 16));
    }

    #[test]
    fn test_invalid_rotation_rejected_without_state_change() {
        let (mut device, sink) = make_unthrottled();
        assert!(!device.set_rotation(4));
        assert_eq!(device.rotation(), Rotation::R0);
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn test_rotation_change_forces_full_transmit() {
        let (mut device, sink) = make_unthrottled();
        assert!(device.set_rotation(2));
        assert_eq!(sink.frames().len(), 1, "rotation must push a full frame");
    }

    #[test]
    fn test_rotation_changes_physical_mapping_of_same_logical_led() {
        // 16×8 surface, rotation 0: led(1,1,15) lands at physical index 0.
        // After rotation(1) the logical extent is 8×16 and led(1,1,15) maps
        // to a different physical index.
        let (mut device, sink) = make_unthrottled();
        device.led(1, 1, 15);
        device.refresh();
        let first = sink.frames()[0].clone();
        assert_eq!(first.find('F'), Some(0));

        device.set_rotation(1);
        device.all(0);
        device.led(1, 1, 15);
        device.refresh();
        let frames = sink.frames();
        let last = frames.last().unwrap();
        // r=1: (1,1) → physical (1, rows+1-1) = (1,8) → index 7*16 = 112.
        assert_eq!(last.find('F'), Some(112));
    }

    #[test]
    fn test_key_event_applies_inverse_transform() {
        let (mut device, _sink) = make_unthrottled();
        let presses: Arc<Mutex<Vec<(u16, u16, bool)>>> = Arc::default();
        let record = Arc::clone(&presses);
        device.set_key_handler(move |x, y, pressed| {
            record.lock().unwrap().push((x, y, pressed));
        });

        device.set_rotation(1);
        // Light logical (3, 5), find its physical position, then report a
        // press there (0-based on the wire) and expect the logical
        // coordinates back.
        let (px, py) = device.rotation().to_physical(16, 8, 3, 5);
        device.handle_key(px - 1, py - 1, true);
        device.handle_key(px - 1, py - 1, false);

        let seen = presses.lock().unwrap();
        assert_eq!(seen.as_slice(), &[(3, 5, true), (3, 5, false)]);
    }

    #[test]
    fn test_key_event_without_handler_is_noop() {
        let (mut device, _sink) = make_unthrottled();
        device.handle_key(0, 0, true); // must not panic
    }

    #[test]
    fn test_key_event_out_of_physical_range_is_dropped() {
        let (mut device, _sink) = make_unthrottled();
        let count: Arc<Mutex<u32>> = Arc::default();
        let counter = Arc::clone(&count);
        device.set_key_handler(move |_, _, _| *counter.lock().unwrap() += 1);

        device.handle_key(16, 0, true);
        device.handle_key(0, 8, true);
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[test]
    fn test_shutdown_pushes_all_zero_frame() {
        let (mut device, sink) = make_unthrottled();
        device.led(4, 4, 12);
        device.refresh();
        device.shutdown();

        let frames = sink.frames();
        assert_eq!(frames.last().unwrap(), &"0".repeat(128));
    }

    #[test]
    fn test_force_frame_bypasses_rate_limit() {
        let (mut device, sink) = make_device(Duration::from_secs(3600));
        device.led(1, 1, 5);
        device.refresh();
        device.force_frame(); // immediately after: still transmits
        assert_eq!(sink.frames().len(), 2);
    }
}
