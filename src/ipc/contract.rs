//! Channel descriptor: service identity and interface contract.
//!
//! Everything needed to locate and safely invoke the UI agent's endpoint is
//! declared here, once, at startup. No I/O.
//!
//! ## Security invariants
//! - The contract offers exactly one operation, `post_notification`.
//! - Payloads are decoded only if their kind is in the allow-list. The
//!   allow-list is a closed enum, so an unrecognized type name on the wire
//!   can never select a decoder.
//! - Producer and consumer compare contracts structurally during the
//!   connection handshake; any difference refuses the connection.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::NotifyConfig;
use crate::error::ChannelError;

// ── Constants ───────────────────────────────────────────────

/// Contract version. Bumped whenever the operation surface or a payload
/// schema changes incompatibly.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum service identity length.
const MAX_SERVICE_ID_LEN: usize = 64;

/// Socket path limit, excluding the trailing NUL. `sun_path` is 104 bytes on
/// macOS and 108 on Linux; the smaller one wins.
pub const MAX_ENDPOINT_PATH_BYTES: usize = 103;

/// Suffix appended to the identity to form the socket file name.
const ENDPOINT_SUFFIX: &str = ".sock";

// ── Payload Kinds ───────────────────────────────────────────

/// Concrete payload types that may cross the channel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    BlockEvent,
    DeviceBlockEvent,
}

impl PayloadKind {
    pub const ALL: [PayloadKind; 2] = [PayloadKind::BlockEvent, PayloadKind::DeviceBlockEvent];

    /// Wire name used in the `payload_type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockEvent => "block_event",
            Self::DeviceBlockEvent => "device_block_event",
        }
    }

    /// Map a wire name to a kind. Unknown names map to `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Operation Surface ───────────────────────────────────────

/// Remotely invocable operations.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    PostNotification,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostNotification => "post_notification",
        }
    }
}

/// Declared argument type of an operation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentType {
    Notification,
}

// ── Interface Contract ──────────────────────────────────────

/// The full wire contract: operation, argument type, allow-list.
///
/// Compared with `==` during the handshake.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InterfaceContract {
    protocol_version: u32,
    operation: Operation,
    argument: ArgumentType,
    allowed_payloads: BTreeSet<PayloadKind>,
}

impl InterfaceContract {
    /// Build a contract with an explicit allow-list.
    pub fn new(
        protocol_version: u32,
        allowed: impl IntoIterator<Item = PayloadKind>,
    ) -> Result<Self, ChannelError> {
        if protocol_version != PROTOCOL_VERSION {
            return Err(ChannelError::UnsupportedProtocolVersion(protocol_version));
        }
        let allowed_payloads: BTreeSet<PayloadKind> = allowed.into_iter().collect();
        if allowed_payloads.is_empty() {
            return Err(ChannelError::EmptyAllowList);
        }
        Ok(Self {
            protocol_version,
            operation: Operation::PostNotification,
            argument: ArgumentType::Notification,
            allowed_payloads,
        })
    }

    /// The contract this build publishes: every payload kind it knows.
    pub fn current() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            operation: Operation::PostNotification,
            argument: ArgumentType::Notification,
            allowed_payloads: PayloadKind::ALL.into_iter().collect(),
        }
    }

    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn argument(&self) -> ArgumentType {
        self.argument
    }

    pub fn allowed_payloads(&self) -> impl Iterator<Item = PayloadKind> + '_ {
        self.allowed_payloads.iter().copied()
    }

    pub fn permits(&self, kind: PayloadKind) -> bool {
        self.allowed_payloads.contains(&kind)
    }

    /// Resolve a wire `payload_type` against the allow-list.
    ///
    /// Returns `None` for unknown names and for known kinds this contract
    /// does not permit. Callers must not decode the payload on `None`.
    pub fn permitted_kind(&self, wire_name: &str) -> Option<PayloadKind> {
        PayloadKind::from_wire(wire_name).filter(|k| self.permits(*k))
    }

    /// Short description of the first structural difference, for logs.
    pub fn mismatch_reason(&self, other: &InterfaceContract) -> Option<String> {
        if self.protocol_version != other.protocol_version {
            return Some(format!(
                "protocol version {} != {}",
                other.protocol_version, self.protocol_version
            ));
        }
        if self.operation != other.operation || self.argument != other.argument {
            return Some("operation signature differs".to_string());
        }
        if self.allowed_payloads != other.allowed_payloads {
            return Some("allowed payload types differ".to_string());
        }
        None
    }
}

// ── Service Identity ────────────────────────────────────────

/// Validated, stable name of the consumer endpoint (reverse-DNS style).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceIdentity(String);

impl ServiceIdentity {
    pub fn new(name: impl Into<String>) -> Result<Self, ChannelError> {
        let name = name.into();
        let invalid = |reason| ChannelError::InvalidServiceIdentity {
            identity: name.clone(),
            reason,
        };
        if name.is_empty() {
            return Err(invalid("empty"));
        }
        if name.len() > MAX_SERVICE_ID_LEN {
            return Err(invalid("longer than 64 bytes"));
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
        {
            return Err(invalid("only [A-Za-z0-9._-] allowed"));
        }
        if name.starts_with('.') || name.ends_with('.') || name.contains("..") {
            return Err(invalid("empty dot-separated component"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Socket path for this identity inside `runtime_dir`.
    pub fn endpoint_in(&self, runtime_dir: &Path) -> PathBuf {
        runtime_dir.join(format!("{}{}", self.0, ENDPOINT_SUFFIX))
    }
}

impl TryFrom<String> for ServiceIdentity {
    type Error = ChannelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServiceIdentity> for String {
    fn from(id: ServiceIdentity) -> Self {
        id.0
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Channel Descriptor ──────────────────────────────────────

/// Process-wide, immutable description of the notification channel.
///
/// Shared by reference (`Arc`) with every relay and listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    identity: ServiceIdentity,
    endpoint: PathBuf,
    contract: InterfaceContract,
}

impl ChannelDescriptor {
    /// Build a descriptor. Fails only on misconfiguration.
    pub fn new(
        identity: ServiceIdentity,
        runtime_dir: &Path,
        contract: InterfaceContract,
    ) -> Result<Self, ChannelError> {
        let endpoint = identity.endpoint_in(runtime_dir);
        let len = endpoint.as_os_str().len();
        if len > MAX_ENDPOINT_PATH_BYTES {
            return Err(ChannelError::EndpointPathTooLong {
                path: endpoint,
                len,
                max: MAX_ENDPOINT_PATH_BYTES,
            });
        }
        Ok(Self {
            identity,
            endpoint,
            contract,
        })
    }

    /// Descriptor for the configured identity with the current contract.
    pub fn from_config(config: &NotifyConfig) -> Result<Self, ChannelError> {
        let identity = ServiceIdentity::new(config.service_id.clone())?;
        Self::new(identity, &config.runtime_dir, InterfaceContract::current())
    }

    /// The stable name used to locate the consumer.
    pub fn resolve_service_identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// An owned copy of the contract, e.g. for embedding in a handshake.
    pub fn build_interface_contract(&self) -> InterfaceContract {
        self.contract.clone()
    }

    pub fn contract(&self) -> &InterfaceContract {
        &self.contract
    }

    /// Resolved socket path of the consumer endpoint.
    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }
}

// ── Tests ───────────────────────────────────────────────────
