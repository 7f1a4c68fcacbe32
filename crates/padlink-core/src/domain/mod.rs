//! Pure domain primitives with no I/O dependencies.
//!
//! # Sub-modules
//!
//! - **`frame`** – The packed brightness buffer: 4-bit levels, a dirty bitset
//!   tracking exactly which elements changed since the last transmit, and the
//!   committed snapshot of the last transmitted state.
//!
//! - **`rotation`** – The bijective logical↔physical coordinate transform
//!   letting a fixed physical surface present four orientations without the
//!   remote side ever learning about rotation.

pub mod frame;
pub mod rotation;
