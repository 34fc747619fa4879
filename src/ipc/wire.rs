//! Wire frames for the notification channel.
//!
//! Wire format: NDJSON (one JSON object per line, terminated by `\n`),
//! tagged by the `"type"` field.
//!
//! ```text
//! Relay (producer)                           Listener (consumer)
//!   |  -- hello { service, contract } -->         |
//!   |  <-- hello_ack { protocol_version } ------- |
//!   |      OR hello_nack { reason }               |
//!   |  -- post_notification { id, ts_ms,          |
//!   |       payload_type, payload } -->           |
//!   |  (close)                                    |
//! ```
//!
//! Decoding is fail-closed: the frame type and `payload_type` are checked
//! against the contract on the raw JSON value before any payload struct is
//! deserialized.

use std::io::{BufRead, Read};

use serde::{Deserialize, Serialize};

use super::contract::{InterfaceContract, Operation, PayloadKind, ServiceIdentity};
use super::id::generate_notification_id;
use crate::error::WireError;
use crate::event::{now_ms, Notification};

// ── Constants ───────────────────────────────────────────────

/// Handshake lines are small; cap them hard before the contract is agreed.
pub const MAX_HELLO_LINE_BYTES: usize = 16 * 1024;

/// Maximum `post_notification` line size (64 KiB).
pub const MAX_FRAME_LINE_BYTES: usize = 64 * 1024;

/// Frame types exchanged during the handshake.
const HANDSHAKE_TYPES: &[&str] = &["hello", "hello_ack", "hello_nack"];

// ── Bounded Line Reader ─────────────────────────────────────

/// Read one newline-terminated line of at most `max` bytes (newline
/// excluded). Never buffers more than `max + 1` bytes.
///
/// A trailing `\r` is stripped. A final line without newline is accepted.
pub fn read_line_bounded<R: BufRead>(reader: &mut R, max: usize) -> Result<String, WireError> {
    let mut buf = Vec::new();
    let n = reader
        .by_ref()
        .take(max as u64 + 1)
        .read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(WireError::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max {
        return Err(WireError::Oversize {
            len: buf.len(),
            max,
        });
    }
    String::from_utf8(buf).map_err(|e| WireError::InvalidJson(e.to_string()))
}

// ── Handshake Frames ────────────────────────────────────────

/// Sent by the relay immediately after connecting.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Hello {
    pub service: ServiceIdentity,
    pub contract: InterfaceContract,
}

/// Contract accepted; the relay may send one notification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HelloAck {
    pub protocol_version: u32,
}

/// Contract refused; the connection is closed after this line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HelloNack {
    pub reason: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandshakeFrame {
    Hello(Hello),
    HelloAck(HelloAck),
    HelloNack(HelloNack),
}

impl HandshakeFrame {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::HelloAck(_) => "hello_ack",
            Self::HelloNack(_) => "hello_nack",
        }
    }
}

/// Parse a handshake line, distinguishing unknown types from malformed ones.
pub fn parse_handshake_line(line: &str) -> Result<HandshakeFrame, WireError> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| WireError::InvalidJson(e.to_string()))?;
    let frame_type = frame_type_of(&value)?;
    if !HANDSHAKE_TYPES.contains(&frame_type) {
        return Err(WireError::UnknownFrameType(frame_type.to_string()));
    }
    serde_json::from_value(value).map_err(|e| WireError::InvalidJson(e.to_string()))
}

// ── Notification Frame ──────────────────────────────────────

#[derive(Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct PostFrame {
    #[serde(rename = "type")]
    operation: Operation,
    id: String,
    ts_ms: u64,
    payload_type: PayloadKind,
    payload: serde_json::Value,
}

/// A notification as decoded by the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedNotification {
    pub id: String,
    pub ts_ms: u64,
    pub notification: Notification,
}

/// Serialize `notification` as a `post_notification` NDJSON line.
///
/// Returns the generated notification ID alongside the line.
pub fn encode_post_frame(notification: &Notification) -> Result<(String, String), WireError> {
    let id = generate_notification_id();
    let frame = PostFrame {
        operation: Operation::PostNotification,
        id: id.clone(),
        ts_ms: now_ms(),
        payload_type: notification.kind(),
        payload: notification.payload_value()?,
    };
    Ok((id, to_ndjson(&frame)?))
}

/// Decode a `post_notification` line under `contract`.
///
/// Order of checks:
/// 1. valid JSON object with a string `type`
/// 2. `type` names an operation the contract offers
/// 3. `payload_type` is in the allow-list
/// 4. only then: decode frame and payload with unknown fields denied
pub fn decode_post_frame(
    line: &str,
    contract: &InterfaceContract,
) -> Result<ReceivedNotification, WireError> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| WireError::InvalidJson(e.to_string()))?;
    let frame_type = frame_type_of(&value)?;
    if frame_type != contract.operation().as_str() {
        if HANDSHAKE_TYPES.contains(&frame_type) {
            return Err(WireError::UnexpectedFrame {
                expected: "post_notification",
                got: frame_type.to_string(),
            });
        }
        return Err(WireError::OperationMismatch(frame_type.to_string()));
    }

    let payload_type = value
        .get("payload_type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WireError::InvalidJson("missing string field `payload_type`".into()))?;
    let kind = contract
        .permitted_kind(payload_type)
        .ok_or_else(|| WireError::PayloadNotAllowed(payload_type.to_string()))?;

    let frame: PostFrame =
        serde_json::from_value(value).map_err(|e| WireError::InvalidJson(e.to_string()))?;
    let notification = Notification::from_payload(kind, frame.payload)
        .map_err(|e| WireError::InvalidJson(e.to_string()))?;
    Ok(ReceivedNotification {
        id: frame.id,
        ts_ms: frame.ts_ms,
        notification,
    })
}

// ── Helpers ─────────────────────────────────────────────────

/// Serialize to a single NDJSON line (with trailing newline).
pub fn to_ndjson<T: Serialize>(frame: &T) -> Result<String, WireError> {
    let mut s = serde_json::to_string(frame)?;
    s.push('\n');
    Ok(s)
}

fn frame_type_of(value: &serde_json::Value) -> Result<&str, WireError> {
    value
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WireError::InvalidJson("missing string field `type`".into()))
}

// ── Tests ───────────────────────────────────────────────────
