//! block-notify-post: producer harness for the notification channel.
//!
//! Builds one notification from flags, posts it through a relay, and prints
//! the delivery outcome.
//!
//! Usage:
//!   block-notify-post block <subject> [--reason <r>] [--message <text>]
//!   block-notify-post device <device> [--mount-on <path>] [--remount <arg>]...
//!
//! Exit codes: 0 delivered, 2 consumer unavailable, 3 rejected, 1 misconfigured.

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;

use block_notifier::cli::{init_tracing, ChannelArgs};
use block_notifier::{
    BlockEvent, BlockReason, DeliveryOutcome, DeviceBlockEvent, Notification, Relay,
};

#[derive(Parser, Debug)]
#[command(name = "block-notify-post", version, about)]
struct Cli {
    #[command(flatten)]
    channel: ChannelArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Post a blocked-execution notification
    Block {
        /// Opaque descriptor of the blocked subject
        subject: String,

        #[arg(long, value_enum, default_value_t = ReasonArg::Unknown)]
        reason: ReasonArg,

        /// Administrator message shown with the block
        #[arg(long)]
        message: Option<String>,
    },

    /// Post a blocked-mount notification
    Device {
        /// Opaque descriptor of the blocked device
        device: String,

        #[arg(long)]
        mount_on: Option<String>,

        /// Remount flag applied instead (repeatable)
        #[arg(long = "remount")]
        remount_args: Vec<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ReasonArg {
    Binary,
    Certificate,
    Scope,
    DefaultPolicy,
    Unknown,
}

impl From<ReasonArg> for BlockReason {
    fn from(r: ReasonArg) -> Self {
        match r {
            ReasonArg::Binary => BlockReason::Binary,
            ReasonArg::Certificate => BlockReason::Certificate,
            ReasonArg::Scope => BlockReason::Scope,
            ReasonArg::DefaultPolicy => BlockReason::DefaultPolicy,
            ReasonArg::Unknown => BlockReason::Unknown,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.channel.verbose);

    let relay = match cli
        .channel
        .to_config()
        .and_then(|config| Relay::from_config(&config))
    {
        Ok(r) => r,
        Err(e) => {
            error!("[post] FATAL: misconfigured channel: {e}");
            return ExitCode::from(1);
        }
    };

    let notification: Notification = match cli.command {
        Commands::Block {
            subject,
            reason,
            message,
        } => {
            let mut event = BlockEvent::new(subject).with_reason(reason.into());
            if let Some(msg) = message {
                event = event.with_custom_message(msg);
            }
            event.into()
        }
        Commands::Device {
            device,
            mount_on,
            remount_args,
        } => {
            let mut event = DeviceBlockEvent::new(device).with_remount_args(remount_args);
            if let Some(path) = mount_on {
                event = event.with_mount_on(path);
            }
            event.into()
        }
    };

    let outcome = relay.post_notification(&notification);
    println!("[post] {} -> {}", notification.kind(), outcome.as_str());
    match outcome {
        DeliveryOutcome::Delivered => ExitCode::SUCCESS,
        DeliveryOutcome::ConsumerUnavailable => ExitCode::from(2),
        DeliveryOutcome::Rejected => ExitCode::from(3),
    }
}
