//! Session and slot management.
//!
//! The slot manager is the engine's front door: it matches anonymous inbound
//! connection requests to a small fixed pool of device instances, keeps the
//! connect/reconnect/disconnect lifecycle consistent, and routes inbound
//! input messages to the device that owns them.

pub mod slots;

pub use slots::{ConnectOutcome, DeviceDefaults, PoolConfig, SlotEvent, SlotManager};
