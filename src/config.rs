//! Channel configuration.
//!
//! ## Resolution
//! Each field is taken from, in order:
//! 1. the environment (`BLOCK_NOTIFY_SERVICE_ID`, `BLOCK_NOTIFY_RUNTIME_DIR`,
//!    `BLOCK_NOTIFY_TIMEOUT_MS`), then
//! 2. the built-in default.
//!
//! The runtime directory defaults to `$XDG_RUNTIME_DIR`, or `/tmp` when that
//! is unset. Binaries layer CLI flags on top via `clap`.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ChannelError;

// ── Constants ───────────────────────────────────────────────

/// Well-known name of the UI agent's notification endpoint.
pub const DEFAULT_SERVICE_ID: &str = "dev.blocknotify.notifier";

/// Upper bound on a single `post_notification` call (connect + dispatch).
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_millis(500);

/// Fallback runtime directory when `XDG_RUNTIME_DIR` is unset.
const FALLBACK_RUNTIME_DIR: &str = "/tmp";

pub const ENV_SERVICE_ID: &str = "BLOCK_NOTIFY_SERVICE_ID";
pub const ENV_RUNTIME_DIR: &str = "BLOCK_NOTIFY_RUNTIME_DIR";
pub const ENV_TIMEOUT_MS: &str = "BLOCK_NOTIFY_TIMEOUT_MS";

// ── Config ──────────────────────────────────────────────────

/// Process-wide channel settings. Built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    pub service_id: String,
    pub runtime_dir: PathBuf,
    pub delivery_timeout: Duration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            service_id: DEFAULT_SERVICE_ID.to_string(),
            runtime_dir: runtime_dir_from(|key| std::env::var(key).ok()),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }
}

impl NotifyConfig {
    /// Build from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ChannelError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Lets tests avoid mutating the
    /// real process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ChannelError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|s| !s.is_empty());
        let service_id =
            non_empty(ENV_SERVICE_ID).unwrap_or_else(|| DEFAULT_SERVICE_ID.to_string());
        let runtime_dir = non_empty(ENV_RUNTIME_DIR)
            .or_else(|| non_empty("XDG_RUNTIME_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(FALLBACK_RUNTIME_DIR));
        let delivery_timeout = match lookup(ENV_TIMEOUT_MS) {
            Some(ms) => parse_timeout_ms(&ms)?,
            None => DEFAULT_DELIVERY_TIMEOUT,
        };
        Ok(Self {
            service_id,
            runtime_dir,
            delivery_timeout,
        })
    }
}

/// Parse a millisecond timeout. Zero is rejected: a zero deadline would
/// make every delivery fail before connecting.
pub fn parse_timeout_ms(raw: &str) -> Result<Duration, ChannelError> {
    let ms: u64 = raw
        .trim()
        .parse()
        .map_err(|_| ChannelError::InvalidTimeout(format!("{raw:?} is not a number")))?;
    if ms == 0 {
        return Err(ChannelError::InvalidTimeout("must be > 0 ms".to_string()));
    }
    Ok(Duration::from_millis(ms))
}

fn runtime_dir_from<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("XDG_RUNTIME_DIR")
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(FALLBACK_RUNTIME_DIR))
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = NotifyConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.service_id, DEFAULT_SERVICE_ID);
        assert_eq!(config.runtime_dir, PathBuf::from(FALLBACK_RUNTIME_DIR));
        assert_eq!(config.delivery_timeout, DEFAULT_DELIVERY_TIMEOUT);
    }

    #[test]
    fn explicit_runtime_dir_beats_xdg() {
        let config = NotifyConfig::from_lookup(lookup_from(&[
            ("XDG_RUNTIME_DIR", "/run/user/501"),
            (ENV_RUNTIME_DIR, "/var/run/notify"),
        ]))
        .unwrap();
        assert_eq!(config.runtime_dir, PathBuf::from("/var/run/notify"));
    }

    #[test]
    fn xdg_runtime_dir_used_when_no_override() {
        let config =
            NotifyConfig::from_lookup(lookup_from(&[("XDG_RUNTIME_DIR", "/run/user/501")]))
                .unwrap();
        assert_eq!(config.runtime_dir, PathBuf::from("/run/user/501"));
    }

    #[test]
    fn service_id_and_timeout_overrides() {
        let config = NotifyConfig::from_lookup(lookup_from(&[
            (ENV_SERVICE_ID, "org.example.agent"),
            (ENV_TIMEOUT_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.service_id, "org.example.agent");
        assert_eq!(config.delivery_timeout, Duration::from_millis(250));
    }

    #[test]
    fn invalid_timeout_is_misconfiguration() {
        for raw in ["soon", "0", "-5"] {
            let err = NotifyConfig::from_lookup(lookup_from(&[(ENV_TIMEOUT_MS, raw)])).unwrap_err();
            assert!(matches!(err, ChannelError::InvalidTimeout(_)), "raw={raw}");
        }
    }
}
