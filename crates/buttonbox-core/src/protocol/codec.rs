//! Binary codec for encoding and decoding ButtonBox wire messages.
//!
//! Wire format:
//! ```text
//! [version:1][msg_type:1][reserved:2][payload_len:4][seq:8][timestamp_us:8][payload:N]
//! ```
//! Total header size: 24 bytes. All multi-byte integers are big-endian.
//! One datagram carries exactly one message.
//!
//! The encoding is deliberately tagged and length-delimited rather than a
//! serde-derived blob: a receiver that does not know a message type byte can
//! log and drop the datagram without misparsing anything, which is how new
//! Command kinds are introduced without breaking older receivers.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::protocol::messages::{
    Command, MessageType, ModifierFlags, PressKind, WireMessage, HEADER_SIZE, PROTOCOL_VERSION,
};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed (field out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded payload length field does not match the data available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`WireMessage`] into a byte vector including the 24-byte header.
///
/// The sequence number is **not** set by this function – pass a
/// pre-incremented value from a [`crate::protocol::SequenceCounter`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use buttonbox_core::protocol::{encode_message, decode_message};
/// use buttonbox_core::protocol::messages::WireMessage;
///
/// let msg = WireMessage::Ping(42);
/// let bytes = encode_message(&msg, 0, 0).unwrap();
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(
    msg: &WireMessage,
    sequence_number: u64,
    timestamp_us: u64,
) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(msg)?;
    let payload_len = payload.len() as u32;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());

    // Header: version (1) + msg_type (1) + reserved (2) + payload_len (4) +
    //         seq (8) + timestamp_us (8) = 24 bytes
    buf.push(PROTOCOL_VERSION);
    buf.push(msg.message_type() as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(&sequence_number.to_be_bytes());
    buf.extend_from_slice(&timestamp_us.to_be_bytes());

    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Encodes a [`WireMessage`] using the current system time as the timestamp.
///
/// # Errors
///
/// Returns [`ProtocolError`] if serialization fails.
pub fn encode_message_now(
    msg: &WireMessage,
    sequence_number: u64,
) -> Result<Vec<u8>, ProtocolError> {
    let timestamp_us = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64;
    encode_message(msg, sequence_number, timestamp_us)
}

/// Decodes one [`WireMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed
/// (header + payload), so a caller reading from a stream can advance its
/// cursor.  Datagram callers should expect `consumed == bytes.len()`.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_message(bytes: &[u8]) -> Result<(WireMessage, usize), ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let msg_type_byte = bytes[1];
    let msg_type = MessageType::try_from(msg_type_byte)
        .map_err(|_| ProtocolError::UnknownMessageType(msg_type_byte))?;

    // bytes[2..4] are reserved – ignored on decode

    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;

    let total_needed = HEADER_SIZE + payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: payload_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }

    let payload = &bytes[HEADER_SIZE..HEADER_SIZE + payload_len];
    let msg = decode_payload(msg_type, payload)?;
    Ok((msg, total_needed))
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &WireMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    match msg {
        WireMessage::Ping(token) => buf.extend_from_slice(&token.to_be_bytes()),
        WireMessage::Pong(token) => buf.extend_from_slice(&token.to_be_bytes()),
        WireMessage::Discover(token) => buf.extend_from_slice(&token.to_be_bytes()),
        WireMessage::Announce { name, command_port } => {
            write_length_prefixed_string(&mut buf, name);
            buf.extend_from_slice(&command_port.to_be_bytes());
        }
        WireMessage::Command(cmd) => match cmd {
            Command::KeyEvent {
                key,
                modifiers,
                press,
            } => encode_key_event(&mut buf, key, *modifiers, *press),
            Command::HoldStart { key, modifiers } => {
                write_length_prefixed_string(&mut buf, key);
                buf.push(modifiers.0);
            }
            Command::HoldStop { key } => write_length_prefixed_string(&mut buf, key),
            Command::Axis { axis, value } => {
                buf.push(*axis);
                buf.extend_from_slice(&value.to_be_bytes());
            }
            Command::MacroInvoke { macro_id } => write_length_prefixed_string(&mut buf, macro_id),
        },
    }
    Ok(buf)
}

/// KeyEvent payload: key (len-prefixed) + modifiers (1) + press_kind (1)
/// + hold duration (4, only when press_kind is Hold).
fn encode_key_event(buf: &mut Vec<u8>, key: &str, modifiers: ModifierFlags, press: PressKind) {
    write_length_prefixed_string(buf, key);
    buf.push(modifiers.0);
    match press {
        PressKind::Tap => buf.push(0x01),
        PressKind::Hold { duration_ms } => {
            buf.push(0x02);
            buf.extend_from_slice(&duration_ms.to_be_bytes());
        }
    }
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<WireMessage, ProtocolError> {
    match msg_type {
        MessageType::Ping => {
            let token = read_u64(payload, 0)?;
            Ok(WireMessage::Ping(token))
        }
        MessageType::Pong => {
            let token = read_u64(payload, 0)?;
            Ok(WireMessage::Pong(token))
        }
        MessageType::Discover => {
            let token = read_u64(payload, 0)?;
            Ok(WireMessage::Discover(token))
        }
        MessageType::Announce => {
            let (name, port_off) = read_length_prefixed_string(payload, 0)?;
            require_len(payload, port_off + 2, "Announce.command_port")?;
            let command_port = u16::from_be_bytes([payload[port_off], payload[port_off + 1]]);
            Ok(WireMessage::Announce { name, command_port })
        }
        MessageType::KeyEvent => decode_key_event(payload).map(WireMessage::Command),
        MessageType::HoldStart => {
            let (key, end) = read_length_prefixed_string(payload, 0)?;
            require_len(payload, end + 1, "HoldStart.modifiers")?;
            let modifiers = ModifierFlags(payload[end]);
            Ok(WireMessage::Command(Command::HoldStart { key, modifiers }))
        }
        MessageType::HoldStop => {
            let (key, _) = read_length_prefixed_string(payload, 0)?;
            Ok(WireMessage::Command(Command::HoldStop { key }))
        }
        MessageType::Axis => {
            // 1 (axis) + 2 (value) = 3
            require_len(payload, 3, "Axis")?;
            let axis = payload[0];
            let value = i16::from_be_bytes([payload[1], payload[2]]);
            Ok(WireMessage::Command(Command::Axis { axis, value }))
        }
        MessageType::MacroInvoke => {
            let (macro_id, _) = read_length_prefixed_string(payload, 0)?;
            Ok(WireMessage::Command(Command::MacroInvoke { macro_id }))
        }
    }
}

fn decode_key_event(p: &[u8]) -> Result<Command, ProtocolError> {
    let (key, mods_off) = read_length_prefixed_string(p, 0)?;
    require_len(p, mods_off + 2, "KeyEvent")?;
    let modifiers = ModifierFlags(p[mods_off]);
    let press = match p[mods_off + 1] {
        0x01 => PressKind::Tap,
        0x02 => {
            let dur_off = mods_off + 2;
            require_len(p, dur_off + 4, "KeyEvent.hold_duration")?;
            let duration_ms = u32::from_be_bytes([
                p[dur_off],
                p[dur_off + 1],
                p[dur_off + 2],
                p[dur_off + 3],
            ]);
            PressKind::Hold { duration_ms }
        }
        other => {
            return Err(ProtocolError::MalformedPayload(format!(
                "unknown press kind: {other}"
            )));
        }
    };
    Ok(Command::KeyEvent {
        key,
        modifiers,
        press,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, ProtocolError> {
    if buf.len() < offset + 8 {
        return Err(ProtocolError::InsufficientData {
            needed: offset + 8,
            available: buf.len(),
        });
    }
    Ok(u64::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
        buf[offset + 4],
        buf[offset + 5],
        buf[offset + 6],
        buf[offset + 7],
    ]))
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&bytes[..len as usize]);
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(
    buf: &[u8],
    offset: usize,
) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
