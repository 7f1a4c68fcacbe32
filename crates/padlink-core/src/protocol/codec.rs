//! Binary codec for Padlink path-addressed datagrams.
//!
//! Wire format:
//! ```text
//! [version:1][path_len:2][path:UTF-8][arg_count:2][args…]
//! arg := [tag:1][value]
//! tag 'i' (0x69) → int32
//! tag 's' (0x73) → [len:2][UTF-8 bytes]
//! ```
//! All multi-byte integers are big-endian.  One datagram carries exactly one
//! message; datagram boundaries come from the transport, so no total-length
//! field is needed.

use thiserror::Error;

use crate::protocol::messages::{
    DeviceCategory, WireMessage, PATH_CONNECT, PATH_CONNECTED, PATH_DISCONNECT,
    PATH_DISCONNECTED, PATH_REFUSED, PATH_RING_ALL, PATH_RING_DELTA, PATH_RING_KEY,
    PATH_RING_MAP, PATH_RING_SET, PATH_SURFACE_FRAME, PATH_SURFACE_KEY, PROTOCOL_VERSION,
};

/// Argument tag byte for a big-endian int32.
const TAG_INT: u8 = b'i';

/// Argument tag byte for a length-prefixed UTF-8 string.
const TAG_STR: u8 = b's';

/// Errors that can occur while decoding a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The datagram is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The version byte is not a supported protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The path does not name a known message.
    #[error("unknown path: {0:?}")]
    UnknownPath(String),

    /// The argument list does not match the message's signature
    /// (wrong count, wrong tag, or a value out of range).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Typed argument representation ─────────────────────────────────────────────

/// One decoded datagram argument.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Int(i32),
    Str(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`WireMessage`] into one datagram.
///
/// Encoding is infallible: every field is already range-constrained by its
/// Rust type, and oversized strings are clamped to the 16-bit length prefix.
pub fn encode_message(msg: &WireMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    buf.push(PROTOCOL_VERSION);
    write_str(&mut buf, msg.path());

    match msg {
        WireMessage::ConnectRequest { id, category, dims } => {
            let count: u16 = if dims.is_some() { 4 } else { 2 };
            buf.extend_from_slice(&count.to_be_bytes());
            write_int_arg(&mut buf, *id);
            write_str_arg(&mut buf, category.as_str());
            if let Some((a, b)) = dims {
                write_int_arg(&mut buf, *a as i32);
                write_int_arg(&mut buf, *b as i32);
            }
        }
        WireMessage::ConnectAck { id, category, cols, rows } => {
            buf.extend_from_slice(&4u16.to_be_bytes());
            write_int_arg(&mut buf, *id);
            write_str_arg(&mut buf, category.as_str());
            write_int_arg(&mut buf, *cols as i32);
            write_int_arg(&mut buf, *rows as i32);
        }
        WireMessage::ConnectRefuse => {
            buf.extend_from_slice(&0u16.to_be_bytes());
        }
        WireMessage::DisconnectRequest { id } => {
            let count: u16 = if id.is_some() { 1 } else { 0 };
            buf.extend_from_slice(&count.to_be_bytes());
            if let Some(id) = id {
                write_int_arg(&mut buf, *id);
            }
        }
        WireMessage::DisconnectNotice { id } => {
            buf.extend_from_slice(&1u16.to_be_bytes());
            write_int_arg(&mut buf, *id);
        }
        WireMessage::SurfaceFrame { hex } => {
            buf.extend_from_slice(&1u16.to_be_bytes());
            write_str_arg(&mut buf, hex);
        }
        WireMessage::SurfaceKey { x, y, pressed } => {
            buf.extend_from_slice(&3u16.to_be_bytes());
            write_int_arg(&mut buf, *x as i32);
            write_int_arg(&mut buf, *y as i32);
            write_int_arg(&mut buf, i32::from(*pressed));
        }
        WireMessage::RingSet { ring, x, level } => {
            buf.extend_from_slice(&3u16.to_be_bytes());
            write_int_arg(&mut buf, *ring as i32);
            write_int_arg(&mut buf, *x as i32);
            write_int_arg(&mut buf, *level as i32);
        }
        WireMessage::RingAll { ring, level } => {
            buf.extend_from_slice(&2u16.to_be_bytes());
            write_int_arg(&mut buf, *ring as i32);
            write_int_arg(&mut buf, *level as i32);
        }
        WireMessage::RingMap { ring, levels } => {
            let count = 1 + levels.len().min(u16::MAX as usize - 1);
            buf.extend_from_slice(&(count as u16).to_be_bytes());
            write_int_arg(&mut buf, *ring as i32);
            for level in levels.iter().take(count - 1) {
                write_int_arg(&mut buf, *level as i32);
            }
        }
        WireMessage::RingDelta { ring, delta } => {
            buf.extend_from_slice(&2u16.to_be_bytes());
            write_int_arg(&mut buf, *ring as i32);
            write_int_arg(&mut buf, *delta);
        }
        WireMessage::RingKey { ring, pressed } => {
            buf.extend_from_slice(&2u16.to_be_bytes());
            write_int_arg(&mut buf, *ring as i32);
            write_int_arg(&mut buf, i32::from(*pressed));
        }
    }

    buf
}

/// Decodes one [`WireMessage`] from a datagram.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the datagram is truncated, carries an
/// unsupported version or unknown path, or its arguments do not match the
/// message signature.  Decoding never panics on hostile input.
pub fn decode_message(bytes: &[u8]) -> Result<WireMessage, ProtocolError> {
    if bytes.is_empty() {
        return Err(ProtocolError::InsufficientData { needed: 1, available: 0 });
    }
    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let mut offset = 1;
    let path = read_str(bytes, &mut offset)?;

    let arg_count = read_u16(bytes, &mut offset)? as usize;
    let mut args = Vec::with_capacity(arg_count.min(128));
    for _ in 0..arg_count {
        args.push(read_arg(bytes, &mut offset)?);
    }

    match path.as_str() {
        PATH_CONNECT => decode_connect_request(&args),
        PATH_CONNECTED => decode_connect_ack(&args),
        PATH_REFUSED => Ok(WireMessage::ConnectRefuse),
        PATH_DISCONNECT => decode_disconnect_request(&args),
        PATH_DISCONNECTED => Ok(WireMessage::DisconnectNotice { id: int_arg(&args, 0, "DisconnectNotice.id")? }),
        PATH_SURFACE_FRAME => Ok(WireMessage::SurfaceFrame { hex: str_arg(&args, 0, "SurfaceFrame.hex")? }),
        PATH_SURFACE_KEY => decode_surface_key(&args),
        PATH_RING_SET => decode_ring_set(&args),
        PATH_RING_ALL => decode_ring_all(&args),
        PATH_RING_MAP => decode_ring_map(&args),
        PATH_RING_DELTA => decode_ring_delta(&args),
        PATH_RING_KEY => decode_ring_key(&args),
        _ => Err(ProtocolError::UnknownPath(path)),
    }
}

// ── Per-message decode helpers ────────────────────────────────────────────────

fn decode_connect_request(args: &[Arg]) -> Result<WireMessage, ProtocolError> {
    let id = int_arg(args, 0, "ConnectRequest.id")?;
    let category = category_arg(args, 1, "ConnectRequest.category")?;
    let dims = match args.len() {
        2 => None,
        4 => Some((
            dim_arg(args, 2, "ConnectRequest.dims.0")?,
            dim_arg(args, 3, "ConnectRequest.dims.1")?,
        )),
        n => {
            return Err(ProtocolError::MalformedPayload(format!(
                "ConnectRequest: expected 2 or 4 args, got {n}"
            )))
        }
    };
    Ok(WireMessage::ConnectRequest { id, category, dims })
}

fn decode_connect_ack(args: &[Arg]) -> Result<WireMessage, ProtocolError> {
    Ok(WireMessage::ConnectAck {
        id: int_arg(args, 0, "ConnectAck.id")?,
        category: category_arg(args, 1, "ConnectAck.category")?,
        cols: dim_arg(args, 2, "ConnectAck.cols")?,
        rows: dim_arg(args, 3, "ConnectAck.rows")?,
    })
}

fn decode_disconnect_request(args: &[Arg]) -> Result<WireMessage, ProtocolError> {
    let id = match args.len() {
        0 => None,
        _ => Some(int_arg(args, 0, "DisconnectRequest.id")?),
    };
    Ok(WireMessage::DisconnectRequest { id })
}

fn decode_surface_key(args: &[Arg]) -> Result<WireMessage, ProtocolError> {
    Ok(WireMessage::SurfaceKey {
        x: coord_arg(args, 0, "SurfaceKey.x")?,
        y: coord_arg(args, 1, "SurfaceKey.y")?,
        pressed: state_arg(args, 2, "SurfaceKey.state")?,
    })
}

fn decode_ring_set(args: &[Arg]) -> Result<WireMessage, ProtocolError> {
    Ok(WireMessage::RingSet {
        ring: ring_arg(args, 0, "RingSet.ring")?,
        x: coord_arg(args, 1, "RingSet.x")?,
        level: level_arg(args, 2, "RingSet.level")?,
    })
}

fn decode_ring_all(args: &[Arg]) -> Result<WireMessage, ProtocolError> {
    Ok(WireMessage::RingAll {
        ring: ring_arg(args, 0, "RingAll.ring")?,
        level: level_arg(args, 1, "RingAll.level")?,
    })
}

fn decode_ring_map(args: &[Arg]) -> Result<WireMessage, ProtocolError> {
    if args.is_empty() {
        return Err(ProtocolError::MalformedPayload(
            "RingMap: expected at least 1 arg".to_string(),
        ));
    }
    let ring = ring_arg(args, 0, "RingMap.ring")?;
    let mut levels = Vec::with_capacity(args.len() - 1);
    for i in 1..args.len() {
        levels.push(level_arg(args, i, "RingMap.level")?);
    }
    Ok(WireMessage::RingMap { ring, levels })
}

fn decode_ring_delta(args: &[Arg]) -> Result<WireMessage, ProtocolError> {
    Ok(WireMessage::RingDelta {
        ring: ring_arg(args, 0, "RingDelta.ring")?,
        delta: int_arg(args, 1, "RingDelta.delta")?,
    })
}

fn decode_ring_key(args: &[Arg]) -> Result<WireMessage, ProtocolError> {
    Ok(WireMessage::RingKey {
        ring: ring_arg(args, 0, "RingKey.ring")?,
        pressed: state_arg(args, 1, "RingKey.state")?,
    })
}

// ── Typed argument accessors ──────────────────────────────────────────────────

fn int_arg(args: &[Arg], index: usize, context: &str) -> Result<i32, ProtocolError> {
    match args.get(index) {
        Some(Arg::Int(v)) => Ok(*v),
        Some(Arg::Str(_)) => Err(ProtocolError::MalformedPayload(format!(
            "{context}: expected int argument at {index}, got string"
        ))),
        None => Err(ProtocolError::MalformedPayload(format!(
            "{context}: missing argument at {index}"
        ))),
    }
}

fn str_arg(args: &[Arg], index: usize, context: &str) -> Result<String, ProtocolError> {
    match args.get(index) {
        Some(Arg::Str(s)) => Ok(s.clone()),
        Some(Arg::Int(_)) => Err(ProtocolError::MalformedPayload(format!(
            "{context}: expected string argument at {index}, got int"
        ))),
        None => Err(ProtocolError::MalformedPayload(format!(
            "{context}: missing argument at {index}"
        ))),
    }
}

fn category_arg(args: &[Arg], index: usize, context: &str) -> Result<DeviceCategory, ProtocolError> {
    let raw = str_arg(args, index, context)?;
    DeviceCategory::from_wire(&raw)
        .ok_or_else(|| ProtocolError::MalformedPayload(format!("{context}: unknown category {raw:?}")))
}

/// A wire coordinate: 0-based, non-negative, within u16.
fn coord_arg(args: &[Arg], index: usize, context: &str) -> Result<u16, ProtocolError> {
    let v = int_arg(args, index, context)?;
    u16::try_from(v).map_err(|_| {
        ProtocolError::MalformedPayload(format!("{context}: coordinate {v} out of range"))
    })
}

/// A negotiated dimension: positive, within u16.
fn dim_arg(args: &[Arg], index: usize, context: &str) -> Result<u16, ProtocolError> {
    let v = coord_arg(args, index, context)?;
    if v == 0 {
        return Err(ProtocolError::MalformedPayload(format!(
            "{context}: dimension must be positive"
        )));
    }
    Ok(v)
}

/// A 0-based ring number, within u8.
fn ring_arg(args: &[Arg], index: usize, context: &str) -> Result<u8, ProtocolError> {
    let v = int_arg(args, index, context)?;
    u8::try_from(v)
        .map_err(|_| ProtocolError::MalformedPayload(format!("{context}: ring {v} out of range")))
}

/// A brightness level, within u8 (devices clamp to 0..=15 on store).
fn level_arg(args: &[Arg], index: usize, context: &str) -> Result<u8, ProtocolError> {
    let v = int_arg(args, index, context)?;
    u8::try_from(v)
        .map_err(|_| ProtocolError::MalformedPayload(format!("{context}: level {v} out of range")))
}

/// A key/button state: exactly 0 or 1 on the wire.
fn state_arg(args: &[Arg], index: usize, context: &str) -> Result<bool, ProtocolError> {
    match int_arg(args, index, context)? {
        0 => Ok(false),
        1 => Ok(true),
        v => Err(ProtocolError::MalformedPayload(format!(
            "{context}: state must be 0 or 1, got {v}"
        ))),
    }
}

// ── Byte-level helpers ────────────────────────────────────────────────────────

fn write_int_arg(buf: &mut Vec<u8>, v: i32) {
    buf.push(TAG_INT);
    buf.extend_from_slice(&v.to_be_bytes());
}

fn write_str_arg(buf: &mut Vec<u8>, s: &str) {
    buf.push(TAG_STR);
    write_str(buf, s);
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&bytes[..len as usize]);
}

fn read_arg(bytes: &[u8], offset: &mut usize) -> Result<Arg, ProtocolError> {
    let tag = *bytes.get(*offset).ok_or(ProtocolError::InsufficientData {
        needed: *offset + 1,
        available: bytes.len(),
    })?;
    *offset += 1;
    match tag {
        TAG_INT => Ok(Arg::Int(read_i32(bytes, offset)?)),
        TAG_STR => Ok(Arg::Str(read_str(bytes, offset)?)),
        other => Err(ProtocolError::MalformedPayload(format!(
            "unknown argument tag: 0x{other:02X}"
        ))),
    }
}

fn read_u16(bytes: &[u8], offset: &mut usize) -> Result<u16, ProtocolError> {
    let end = *offset + 2;
    if bytes.len() < end {
        return Err(ProtocolError::InsufficientData { needed: end, available: bytes.len() });
    }
    let v = u16::from_be_bytes([bytes[*offset], bytes[*offset + 1]]);
    *offset = end;
    Ok(v)
}

fn read_i32(bytes: &[u8], offset: &mut usize) -> Result<i32, ProtocolError> {
    let end = *offset + 4;
    if bytes.len() < end {
        return Err(ProtocolError::InsufficientData { needed: end, available: bytes.len() });
    }
    let v = i32::from_be_bytes([
        bytes[*offset],
        bytes[*offset + 1],
        bytes[*offset + 2],
        bytes[*offset + 3],
    ]);
    *offset = end;
    Ok(v)
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
fn read_str(bytes: &[u8], offset: &mut usize) -> Result<String, ProtocolError> {
    let len = read_u16(bytes, offset)? as usize;
    let end = *offset + len;
    if bytes.len() < end {
        return Err(ProtocolError::InsufficientData { needed: end, available: bytes.len() });
    }
    let s = std::str::from_utf8(&bytes[*offset..end])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    *offset = end;
    Ok(s)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
