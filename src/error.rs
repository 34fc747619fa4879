//! Error types for channel construction and wire handling.
//!
//! Per-call delivery results are not errors: the relay reports them as
//! [`DeliveryOutcome`](crate::ipc::relay::DeliveryOutcome) values. The types
//! here cover startup misconfiguration and the framing failures the relay
//! and listener map onto those outcomes.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Channel misconfiguration or listener setup failure. Fatal at startup.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid service identity {identity:?}: {reason}")]
    InvalidServiceIdentity {
        identity: String,
        reason: &'static str,
    },

    #[error("endpoint path {path:?} is {len} bytes, maximum is {max}")]
    EndpointPathTooLong { path: PathBuf, len: usize, max: usize },

    #[error("interface contract declares no allowed payload types")]
    EmptyAllowList,

    #[error("unsupported protocol version {0}")]
    UnsupportedProtocolVersion(u32),

    #[error("invalid delivery timeout: {0}")]
    InvalidTimeout(String),

    #[error("listener I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Framing, negotiation, and decode failures on a single connection.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("line exceeds {max} bytes (got {len})")]
    Oversize { len: usize, max: usize },

    #[error("connection closed by peer")]
    Eof,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    #[error("expected {expected} frame, got {got}")]
    UnexpectedFrame { expected: &'static str, got: String },

    #[error("operation {0:?} is not offered by this channel")]
    OperationMismatch(String),

    #[error("payload type {0:?} is not in the allow-list")]
    PayloadNotAllowed(String),

    #[error("contract refused: {0}")]
    ContractRefused(String),

    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl WireError {
    /// Stable tag for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Oversize { .. } => "IPC_OVERSIZE",
            Self::Eof => "IPC_EOF",
            Self::Io(_) => "IPC_IO",
            Self::InvalidJson(_) => "IPC_INVALID_JSON",
            Self::UnknownFrameType(_) => "IPC_UNKNOWN_TYPE",
            Self::UnexpectedFrame { .. } => "IPC_UNEXPECTED_FRAME",
            Self::OperationMismatch(_) => "IPC_OPERATION_MISMATCH",
            Self::PayloadNotAllowed(_) => "IPC_PAYLOAD_NOT_ALLOWED",
            Self::ContractRefused(_) => "IPC_CONTRACT_REFUSED",
            Self::Serialize(_) => "IPC_SERIALIZE",
        }
    }

    /// `true` when the peer sent something the contract forbids, as opposed
    /// to the connection simply going away.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::Oversize { .. }
                | Self::InvalidJson(_)
                | Self::UnknownFrameType(_)
                | Self::UnexpectedFrame { .. }
                | Self::OperationMismatch(_)
                | Self::PayloadNotAllowed(_)
        )
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_are_distinct() {
        let errors = [
            WireError::Oversize { len: 2, max: 1 },
            WireError::Eof,
            WireError::Io(io::Error::new(io::ErrorKind::Other, "x")),
            WireError::InvalidJson("x".into()),
            WireError::UnknownFrameType("x".into()),
            WireError::UnexpectedFrame {
                expected: "hello",
                got: "x".into(),
            },
            WireError::OperationMismatch("x".into()),
            WireError::PayloadNotAllowed("x".into()),
            WireError::ContractRefused("x".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(WireError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn oversize_is_protocol_violation() {
        assert!(WireError::Oversize { len: 10, max: 1 }.is_protocol_violation());
        assert!(WireError::PayloadNotAllowed("t".into()).is_protocol_violation());
        assert!(!WireError::Eof.is_protocol_violation());
        assert!(!WireError::ContractRefused("v2".into()).is_protocol_violation());
    }

    #[test]
    fn channel_error_display_names_identity() {
        let e = ChannelError::InvalidServiceIdentity {
            identity: "../evil".into(),
            reason: "contains '/'",
        };
        let msg = e.to_string();
        assert!(msg.contains("../evil"));
        assert!(msg.contains("contains '/'"));
    }
}
