//! Block notifier: relays "action blocked" events from a privileged
//! enforcement daemon to an unprivileged UI agent.
//!
//! The daemon builds a [`Notification`], hands it to a [`Relay`], and gets a
//! [`DeliveryOutcome`] back within a fixed deadline. The agent runs a
//! [`NotificationListener`] on the socket named by the shared
//! [`ChannelDescriptor`].

pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod ipc;

pub use config::NotifyConfig;
pub use error::{ChannelError, WireError};
pub use event::{BlockEvent, BlockReason, DeviceBlockEvent, Notification};
pub use ipc::contract::{ChannelDescriptor, InterfaceContract, PayloadKind, ServiceIdentity};
pub use ipc::listener::NotificationListener;
pub use ipc::relay::{DeliveryOutcome, Relay};
pub use ipc::wire::ReceivedNotification;
