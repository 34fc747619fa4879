//! Notification payloads sent from the enforcement daemon to the UI agent.
//!
//! Every payload is an immutable value: fields are private, built once through
//! the `with_*` builders, and read through getters. Payloads are copied across
//! the process boundary, never shared.
//!
//! All payload structs reject unknown fields on decode so a consumer never
//! accepts data it was not built to expect.

use serde::{Deserialize, Serialize};

use crate::ipc::contract::PayloadKind;

// ── Block Reason ────────────────────────────────────────────

/// Why the enforcement engine blocked the action.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// A rule matched the binary hash.
    Binary,
    /// A rule matched the signing certificate.
    Certificate,
    /// The binary was outside an allowed scope.
    Scope,
    /// No rule matched and the default policy blocks.
    DefaultPolicy,
    #[default]
    Unknown,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Certificate => "certificate",
            Self::Scope => "scope",
            Self::DefaultPolicy => "default_policy",
            Self::Unknown => "unknown",
        }
    }
}

// ── Block Event ─────────────────────────────────────────────

/// A blocked execution or file action.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BlockEvent {
    subject_descriptor: String,
    #[serde(default)]
    reason: BlockReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_message: Option<String>,
    blocked_at_ms: u64,
}

impl BlockEvent {
    /// Create an event for `subject_descriptor`, stamped with the current time.
    ///
    /// The descriptor is opaque to the channel; its format belongs to the
    /// decision engine that produced it.
    pub fn new(subject_descriptor: impl Into<String>) -> Self {
        Self {
            subject_descriptor: subject_descriptor.into(),
            reason: BlockReason::Unknown,
            custom_message: None,
            blocked_at_ms: now_ms(),
        }
    }

    pub fn with_reason(mut self, reason: BlockReason) -> Self {
        self.reason = reason;
        self
    }

    /// Attach an administrator-configured message to show alongside the block.
    pub fn with_custom_message(mut self, message: impl Into<String>) -> Self {
        self.custom_message = Some(message.into());
        self
    }

    /// Override the block timestamp (tests and replayed decisions).
    pub fn with_blocked_at_ms(mut self, ts_ms: u64) -> Self {
        self.blocked_at_ms = ts_ms;
        self
    }

    pub fn subject_descriptor(&self) -> &str {
        &self.subject_descriptor
    }

    pub fn reason(&self) -> BlockReason {
        self.reason
    }

    pub fn custom_message(&self) -> Option<&str> {
        self.custom_message.as_deref()
    }

    pub fn blocked_at_ms(&self) -> u64 {
        self.blocked_at_ms
    }
}

// ── Device Block Event ──────────────────────────────────────

/// A removable-media mount that was blocked or forced read-only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeviceBlockEvent {
    device_descriptor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mount_on: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    remount_args: Vec<String>,
    blocked_at_ms: u64,
}

impl DeviceBlockEvent {
    pub fn new(device_descriptor: impl Into<String>) -> Self {
        Self {
            device_descriptor: device_descriptor.into(),
            mount_on: None,
            remount_args: Vec::new(),
            blocked_at_ms: now_ms(),
        }
    }

    pub fn with_mount_on(mut self, mount_on: impl Into<String>) -> Self {
        self.mount_on = Some(mount_on.into());
        self
    }

    /// Mount flags the device was remounted with instead (e.g. `rdonly`).
    pub fn with_remount_args(mut self, args: Vec<String>) -> Self {
        self.remount_args = args;
        self
    }

    pub fn with_blocked_at_ms(mut self, ts_ms: u64) -> Self {
        self.blocked_at_ms = ts_ms;
        self
    }

    pub fn device_descriptor(&self) -> &str {
        &self.device_descriptor
    }

    pub fn mount_on(&self) -> Option<&str> {
        self.mount_on.as_deref()
    }

    pub fn remount_args(&self) -> &[String] {
        &self.remount_args
    }

    pub fn blocked_at_ms(&self) -> u64 {
        self.blocked_at_ms
    }
}

// ── Notification ────────────────────────────────────────────

/// The argument of the `post_notification` operation.
///
/// A closed set: the consumer decodes by matching on [`PayloadKind`], never
/// by a type name taken from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Block(BlockEvent),
    DeviceBlock(DeviceBlockEvent),
}

impl Notification {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Block(_) => PayloadKind::BlockEvent,
            Self::DeviceBlock(_) => PayloadKind::DeviceBlockEvent,
        }
    }

    /// The opaque descriptor of whatever was blocked.
    pub fn subject(&self) -> &str {
        match self {
            Self::Block(e) => e.subject_descriptor(),
            Self::DeviceBlock(e) => e.device_descriptor(),
        }
    }

    pub(crate) fn payload_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Block(e) => serde_json::to_value(e),
            Self::DeviceBlock(e) => serde_json::to_value(e),
        }
    }

    pub(crate) fn from_payload(
        kind: PayloadKind,
        payload: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        match kind {
            PayloadKind::BlockEvent => serde_json::from_value(payload).map(Self::Block),
            PayloadKind::DeviceBlockEvent => {
                serde_json::from_value(payload).map(Self::DeviceBlock)
            }
        }
    }
}

impl From<BlockEvent> for Notification {
    fn from(event: BlockEvent) -> Self {
        Self::Block(event)
    }
}

impl From<DeviceBlockEvent> for Notification {
    fn from(event: DeviceBlockEvent) -> Self {
        Self::DeviceBlock(event)
    }
}

/// Current time in milliseconds since UNIX epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Tests ───────────────────────────────────────────────────
