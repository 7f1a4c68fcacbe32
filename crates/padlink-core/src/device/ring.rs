//! Virtual encoder/LED-ring device.
//!
//! Unlike the surface, ring devices transmit every mutation immediately:
//! encoder feedback tracks continuous rotation, and batching would add
//! visible latency.  `refresh()` exists for API symmetry and is a documented
//! no-op.
//!
//! [`segment`](RingDevice::segment) renders an angular range onto the ring
//! with linear anti-aliasing at the two boundary LEDs.  Rotation is
//! continuous, so whole-LED-only rendering would be visibly jittery; the
//! boundary LEDs are dimmed in proportion to how much of their arc the
//! segment covers, computed as interval overlap on a circular domain.

use std::f64::consts::TAU;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::debug;

use crate::device::DatagramSink;
use crate::domain::frame::PackedFrame;
use crate::protocol::messages::WireMessage;

/// Callback invoked for encoder rotation: 1-based ring, signed detent delta.
pub type DeltaHandler = Box<dyn FnMut(u8, i32) + Send>;

/// Callback invoked for encoder button transitions: 1-based ring, pressed.
pub type RingKeyHandler = Box<dyn FnMut(u8, bool) + Send>;

/// A set of circular LED rings bound to one remote client.
pub struct RingDevice {
    rings: u8,
    leds_per_ring: u16,
    frame: PackedFrame,
    client: SocketAddr,
    sink: Arc<dyn DatagramSink>,
    delta_handler: Option<DeltaHandler>,
    key_handler: Option<RingKeyHandler>,
}

impl RingDevice {
    /// Creates a zeroed device with `rings` rings of `leds_per_ring` LEDs.
    pub fn new(
        rings: u8,
        leds_per_ring: u16,
        client: SocketAddr,
        sink: Arc<dyn DatagramSink>,
    ) -> Self {
        Self {
            rings,
            leds_per_ring,
            frame: PackedFrame::new(rings as usize * leds_per_ring as usize),
            client,
            sink,
            delta_handler: None,
            key_handler: None,
        }
    }

    /// Ring count.
    pub fn rings(&self) -> u8 {
        self.rings
    }

    /// LEDs per ring.
    pub fn leds_per_ring(&self) -> u16 {
        self.leds_per_ring
    }

    /// The client endpoint this device transmits to.
    pub fn client(&self) -> SocketAddr {
        self.client
    }

    /// Registers the encoder-rotation callback.  Replaces any previous one.
    pub fn set_delta_handler(&mut self, handler: impl FnMut(u8, i32) + Send + 'static) {
        self.delta_handler = Some(Box::new(handler));
    }

    /// Registers the encoder-button callback.  Replaces any previous one.
    pub fn set_key_handler(&mut self, handler: impl FnMut(u8, bool) + Send + 'static) {
        self.key_handler = Some(Box::new(handler));
    }

    /// Sets one LED: 1-based `ring` and `x`, level clamped to 0..=15.
    /// Out-of-range arguments are silently ignored; in-range writes transmit
    /// immediately (0-based on the wire).
    pub fn led(&mut self, ring: u8, x: u16, level: u8) {
        if ring == 0 || ring > self.rings || x == 0 || x > self.leds_per_ring {
            return;
        }
        let index = self.ring_index(ring, x);
        self.frame.set(index, level);
        self.sink.send(
            self.client,
            WireMessage::RingSet {
                ring: ring - 1,
                x: x - 1,
                level: level.min(crate::domain::frame::MAX_LEVEL),
            },
        );
    }

    /// Sets every LED on every ring to `level`, one `ring-all` per ring.
    pub fn all(&mut self, level: u8) {
        self.frame.set_all(level);
        for ring in 0..self.rings {
            self.sink.send(
                self.client,
                WireMessage::RingAll {
                    ring,
                    level: level.min(crate::domain::frame::MAX_LEVEL),
                },
            );
        }
    }

    /// Reads back one LED level (1-based; 0 when out of range).
    pub fn led_level(&self, ring: u8, x: u16) -> u8 {
        if ring == 0 || ring > self.rings || x == 0 || x > self.leds_per_ring {
            return 0;
        }
        self.frame.get(self.ring_index(ring, x))
    }

    /// Renders the angular range `[from_angle, to_angle)` (radians, measured
    /// in `[0, 2π)`) onto `ring` at `level`, clearing the rest of the ring.
    ///
    /// LED positions come from `pos = angle/(2π) · leds_per_ring`.  The two
    /// boundary LEDs are dimmed linearly by their angular overlap with the
    /// segment; `to_pos < from_pos` wraps through zero, a sweep of a full
    /// turn or more lights the whole ring, and a zero-width sweep lights at
    /// most one LED.  The whole ring transmits as one `ring-map`.
    pub fn segment(&mut self, ring: u8, from_angle: f64, to_angle: f64, level: u8) {
        if ring == 0 || ring > self.rings {
            return;
        }
        let n = self.leds_per_ring as f64;
        let from_pos = (from_angle / TAU * n).rem_euclid(n);
        let mut to_pos = (to_angle / TAU * n).rem_euclid(n);
        let full_turn = (to_angle - from_angle).abs() >= TAU;
        if to_pos < from_pos || (to_pos == from_pos && full_turn) {
            to_pos += n;
        }
        let span = (to_pos - from_pos).min(n);
        let to_pos = from_pos + span;

        // Rebuild the ring from scratch, then push it in one message.
        for x in 1..=self.leds_per_ring {
            let index = self.ring_index(ring, x);
            self.frame.set(index, 0);
        }

        if span > 0.0 {
            let first = from_pos.floor() as i64;
            let last = (to_pos.ceil() as i64) - 1;
            for cell in first..=last {
                let cell_start = cell as f64;
                let overlap = (to_pos.min(cell_start + 1.0) - from_pos.max(cell_start))
                    .clamp(0.0, 1.0);
                let value = (level.min(crate::domain::frame::MAX_LEVEL) as f64 * overlap)
                    .round() as u8;
                let led = cell.rem_euclid(self.leds_per_ring as i64) as u16 + 1;
                let index = self.ring_index(ring, led);
                // A wrapped segment can touch the seam LED from both ends;
                // keep the brighter contribution.
                if value > self.frame.get(index) {
                    self.frame.set(index, value);
                }
            }
        }

        let levels = self.ring_levels(ring);
        self.sink.send(self.client, WireMessage::RingMap { ring: ring - 1, levels });
    }

    /// No-op: ring devices transmit each mutation immediately rather than
    /// batching.
    pub fn refresh(&mut self) {}

    /// Accepted for API parity with genuine hardware; has no effect on a
    /// virtual device.
    pub fn intensity(&mut self, _level: u8) {}

    /// Pushes the complete state of every ring, one `ring-map` each.
    pub fn force_frame(&mut self) {
        for ring in 1..=self.rings {
            let levels = self.ring_levels(ring);
            self.sink.send(self.client, WireMessage::RingMap { ring: ring - 1, levels });
        }
        self.frame.commit();
        self.frame.clear_dirty();
    }

    /// Blanks every ring and pushes one zero `ring-all` per ring.
    pub fn shutdown(&mut self) {
        self.frame.clear();
        for ring in 0..self.rings {
            self.sink.send(self.client, WireMessage::RingAll { ring, level: 0 });
        }
        self.frame.commit();
        self.frame.clear_dirty();
    }

    /// Routes a remote encoder rotation (0-based wire ring) into the delta
    /// callback as a 1-based ring number.
    pub fn handle_delta(&mut self, ring: u8, delta: i32) {
        if ring >= self.rings {
            debug!(ring, "dropped out-of-range encoder delta");
            return;
        }
        if let Some(handler) = self.delta_handler.as_mut() {
            handler(ring + 1, delta);
        }
    }

    /// Routes a remote encoder button transition (0-based wire ring) into the
    /// key callback as a 1-based ring number.
    pub fn handle_key(&mut self, ring: u8, pressed: bool) {
        if ring >= self.rings {
            debug!(ring, "dropped out-of-range encoder key event");
            return;
        }
        if let Some(handler) = self.key_handler.as_mut() {
            handler(ring + 1, pressed);
        }
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    /// Frame index of a 1-based (ring, x) position.
    fn ring_index(&self, ring: u8, x: u16) -> usize {
        (ring as usize - 1) * self.leds_per_ring as usize + (x as usize - 1)
    }

    /// Current levels of one 1-based ring in wire order.
    fn ring_levels(&self, ring: u8) -> Vec<u8> {
        (1..=self.leds_per_ring)
            .map(|x| self.frame.get(self.ring_index(ring, x)))
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
