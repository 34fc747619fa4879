//! block-notifier-agent: consumer harness for the notification channel.
//!
//! Binds the endpoint named by the service identity and prints every
//! notification it receives, one line each, on stdout.
//!
//! Usage:
//!   block-notifier-agent [--service-id <id>] [--runtime-dir <dir>] [-v]

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use block_notifier::cli::{init_tracing, ChannelArgs};
use block_notifier::{ChannelDescriptor, Notification, NotificationListener, ReceivedNotification};

#[derive(Parser, Debug)]
#[command(name = "block-notifier-agent", version, about)]
struct Cli {
    #[command(flatten)]
    channel: ChannelArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.channel.verbose);

    let descriptor = match cli
        .channel
        .to_config()
        .and_then(|config| ChannelDescriptor::from_config(&config))
    {
        Ok(d) => Arc::new(d),
        Err(e) => {
            error!("[agent] FATAL: misconfigured channel: {e}");
            return ExitCode::FAILURE;
        }
    };

    let listener = match NotificationListener::bind(Arc::clone(&descriptor)) {
        Ok(l) => l,
        Err(e) => {
            error!(
                "[agent] FATAL: failed to bind {}: {e}",
                descriptor.endpoint().display()
            );
            return ExitCode::FAILURE;
        }
    };

    info!("[agent] waiting for notifications...");
    while let Some(received) = listener.recv() {
        println!("{}", describe(&received));
    }

    info!("[agent] listener stopped");
    ExitCode::SUCCESS
}

fn describe(received: &ReceivedNotification) -> String {
    match &received.notification {
        Notification::Block(e) => {
            let mut line = format!(
                "[agent] << {} | block_event | subject={} reason={}",
                received.id,
                e.subject_descriptor(),
                e.reason().as_str()
            );
            if let Some(msg) = e.custom_message() {
                line.push_str(&format!(" message={msg:?}"));
            }
            line
        }
        Notification::DeviceBlock(e) => format!(
            "[agent] << {} | device_block_event | device={} mount_on={} remount={}",
            received.id,
            e.device_descriptor(),
            e.mount_on().unwrap_or("-"),
            e.remount_args().join(",")
        ),
    }
}
