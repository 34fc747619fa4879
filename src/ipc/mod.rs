//! Notification channel between the enforcement daemon and the UI agent.
//!
//! Transport: Unix domain socket, NDJSON protocol.
//! Policy: best-effort, one-directional (daemon -> agent). A missing agent
//! never delays enforcement.

pub mod contract;
pub mod id;
pub mod listener;
pub mod relay;
pub mod wire;
