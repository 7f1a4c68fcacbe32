//! Padlink wire protocol: message types and the datagram codec.
//!
//! # Sub-modules
//!
//! - **`messages`** – One typed variant per message the engine sends or
//!   receives, plus the path constants and the [`DeviceCategory`] carried in
//!   connection handshakes.
//!
//! - **`codec`** – The concrete byte framing: a version byte, a
//!   length-prefixed path, and tagged arguments.  Encoding is infallible;
//!   decoding classifies every way a hostile or truncated datagram can fail.
//!
//! The protocol is connectionless and fire-and-forget: there are no
//! acknowledgements, retries, or sequence numbers.  A lost datagram shows up
//! as stale remote state until the next full-frame push.

pub mod codec;
pub mod messages;

pub use codec::{decode_message, encode_message, ProtocolError};
pub use messages::{DeviceCategory, WireMessage};
