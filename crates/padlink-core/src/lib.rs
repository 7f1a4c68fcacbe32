//! # padlink-core
//!
//! Engine library for Padlink, a virtual tactile control surface: a
//! touchscreen application on a remote device stands in for a physical
//! LED/encoder controller, and application code here programs against the
//! same surface API it would use for genuine hardware.
//!
//! The crate has zero dependencies on sockets, file systems, or async
//! runtimes; the `padlink-host` crate supplies those.  It defines:
//!
//! - **`domain`** – The packed brightness buffer with dirty tracking, and the
//!   four-orientation rotation transform.
//!
//! - **`device`** – The two virtual device families: 2D button/LED surfaces
//!   (batched, rate-limited refresh) and encoder LED rings (immediate
//!   per-mutation transmit with anti-aliased segment rendering).  Devices
//!   emit wire messages through the [`DatagramSink`] seam.
//!
//! - **`session`** – The fixed-pool slot manager matching anonymous network
//!   clients to device instances across connect, reconnect, disconnect, and
//!   shutdown.
//!
//! - **`protocol`** – The path-addressed, typed-argument datagram messages
//!   and their binary codec.

pub mod device;
pub mod domain;
pub mod protocol;
pub mod session;

// Re-export the most-used types at the crate root so callers can write
// `padlink_core::SlotManager` instead of spelling out the module path.
pub use device::{DatagramSink, RingDevice, SurfaceDevice, VirtualDevice};
pub use domain::frame::{FrameError, PackedFrame};
pub use domain::rotation::Rotation;
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::{DeviceCategory, WireMessage};
pub use session::slots::{ConnectOutcome, DeviceDefaults, PoolConfig, SlotEvent, SlotManager};
