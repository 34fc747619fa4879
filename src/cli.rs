//! Shared command-line plumbing for the agent and post binaries.

use std::path::PathBuf;

use clap::Args;

use crate::config::{self, NotifyConfig};
use crate::error::ChannelError;

/// Channel flags. Each falls back to its environment variable, then to the
/// built-in default.
#[derive(Args, Debug, Clone, Default)]
pub struct ChannelArgs {
    /// Service identity of the UI agent endpoint
    #[arg(long, env = config::ENV_SERVICE_ID)]
    pub service_id: Option<String>,

    /// Directory holding the endpoint socket
    #[arg(long, env = config::ENV_RUNTIME_DIR)]
    pub runtime_dir: Option<PathBuf>,

    /// Delivery deadline in milliseconds
    #[arg(long, env = config::ENV_TIMEOUT_MS)]
    pub timeout_ms: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl ChannelArgs {
    /// Resolve flags over defaults into a [`NotifyConfig`].
    pub fn to_config(&self) -> Result<NotifyConfig, ChannelError> {
        let mut config = NotifyConfig::default();
        if let Some(id) = &self.service_id {
            config.service_id = id.clone();
        }
        if let Some(dir) = &self.runtime_dir {
            config.runtime_dir = dir.clone();
        }
        if let Some(ms) = &self.timeout_ms {
            config.delivery_timeout = config::parse_timeout_ms(ms)?;
        }
        Ok(config)
    }
}

/// Install the stderr `tracing` subscriber. `RUST_LOG` wins unless
/// `verbose` is set.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("block_notifier=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn flags_override_defaults() {
        let args = ChannelArgs {
            service_id: Some("org.example.agent".into()),
            runtime_dir: Some(PathBuf::from("/run/agent")),
            timeout_ms: Some("75".into()),
            verbose: false,
        };
        let config = args.to_config().unwrap();
        assert_eq!(config.service_id, "org.example.agent");
        assert_eq!(config.runtime_dir, PathBuf::from("/run/agent"));
        assert_eq!(config.delivery_timeout, Duration::from_millis(75));
    }

    #[test]
    fn bad_timeout_flag_is_misconfiguration() {
        let args = ChannelArgs {
            timeout_ms: Some("fast".into()),
            ..ChannelArgs::default()
        };
        assert!(matches!(
            args.to_config(),
            Err(ChannelError::InvalidTimeout(_))
        ));
    }
}
