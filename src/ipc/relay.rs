//! Relay: best-effort delivery of one notification to the UI agent.
//!
//! Policy: never block the enforcement path. Every call is bounded by a single
//! deadline covering connect, handshake and dispatch. A missing or
//! misbehaving consumer yields [`DeliveryOutcome::ConsumerUnavailable`]; the
//! caller's enforcement decision is unaffected.
//!
//! Calls are independent: a fresh connection per notification, no retry, no
//! queue, no state carried across calls. `Relay` is `Send + Sync`, so many
//! threads may post concurrently through one instance.

use std::io::{self, BufReader, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace};

use super::contract::{ChannelDescriptor, PROTOCOL_VERSION};
use super::wire::{
    encode_post_frame, parse_handshake_line, read_line_bounded, to_ndjson, HandshakeFrame, Hello,
    MAX_HELLO_LINE_BYTES,
};
use crate::config::NotifyConfig;
use crate::error::{ChannelError, WireError};
use crate::event::Notification;

// ── Outcome ─────────────────────────────────────────────────

/// Result of one `post_notification` call. Returned as a value, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The notification frame was written to a consumer that accepted the
    /// contract.
    Delivered,
    /// No consumer, connection refused or lost, contract refused, or the
    /// deadline passed.
    ConsumerUnavailable,
    /// The payload kind is not in the channel's allow-list. Nothing was sent.
    Rejected,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::ConsumerUnavailable => "consumer_unavailable",
            Self::Rejected => "rejected",
        }
    }
}

// ── Attempt State ───────────────────────────────────────────

/// Progress of a single delivery attempt. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Connecting,
    Connected,
    Dispatched,
    Delivered,
    ConsumerUnavailable,
}

impl AttemptState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_advance_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connecting, ConsumerUnavailable)
                | (Connected, Dispatched)
                | (Connected, ConsumerUnavailable)
                | (Dispatched, Delivered)
                | (Dispatched, ConsumerUnavailable)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::ConsumerUnavailable)
    }
}

/// Tracks the state of one attempt.
#[derive(Debug)]
struct DeliveryAttempt {
    state: AttemptState,
}

impl DeliveryAttempt {
    fn new() -> Self {
        Self {
            state: AttemptState::Idle,
        }
    }

    fn advance(&mut self, next: AttemptState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "BUG: illegal delivery transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!(from = ?self.state, to = ?next, "delivery attempt transition");
        self.state = next;
    }

    /// Move to `ConsumerUnavailable` unless already terminal.
    fn fail(&mut self) {
        if !self.state.is_terminal() {
            if self.state == AttemptState::Idle {
                self.advance(AttemptState::Connecting);
            }
            self.advance(AttemptState::ConsumerUnavailable);
        }
    }
}

// ── Relay ───────────────────────────────────────────────────

/// Producer side of the notification channel.
#[derive(Debug, Clone)]
pub struct Relay {
    descriptor: Arc<ChannelDescriptor>,
    timeout: Duration,
}

impl Relay {
    /// Create a relay bound to a shared descriptor.
    ///
    /// `timeout` bounds each `post_notification` call end to end.
    pub fn new(descriptor: Arc<ChannelDescriptor>, timeout: Duration) -> Self {
        Self {
            descriptor,
            timeout,
        }
    }

    /// Build descriptor and relay from configuration.
    pub fn from_config(config: &NotifyConfig) -> Result<Self, ChannelError> {
        let descriptor = ChannelDescriptor::from_config(config)?;
        Ok(Self::new(Arc::new(descriptor), config.delivery_timeout))
    }

    pub fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Deliver one notification, best-effort.
    ///
    /// Returns within the configured timeout whether or not a consumer is
    /// running. Payload kinds outside the allow-list are `Rejected` before any
    /// connection is attempted.
    pub fn post_notification(&self, notification: &Notification) -> DeliveryOutcome {
        let service = self.descriptor.resolve_service_identity();
        let kind = notification.kind();

        if !self.descriptor.contract().permits(kind) {
            error!(
                %service,
                payload_type = %kind,
                "[NOTIFY_REJECTED] payload type not in channel allow-list (contract defect)"
            );
            return DeliveryOutcome::Rejected;
        }

        let (id, line) = match encode_post_frame(notification) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(%service, payload_type = %kind, "[NOTIFY_REJECTED] encode failed: {e}");
                return DeliveryOutcome::Rejected;
            }
        };

        let deadline = Instant::now() + self.timeout;
        let mut attempt = DeliveryAttempt::new();
        match self.deliver(&line, deadline, &mut attempt) {
            Ok(()) => {
                attempt.advance(AttemptState::Delivered);
                debug!(
                    %service,
                    id = %id,
                    payload_type = %kind,
                    subject = notification.subject(),
                    "[NOTIFY_DELIVERED]"
                );
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                attempt.fail();
                debug!(
                    %service,
                    id = %id,
                    code = e.code(),
                    "[NOTIFY_CONSUMER_UNAVAILABLE] {e}"
                );
                DeliveryOutcome::ConsumerUnavailable
            }
        }
    }

    fn deliver(
        &self,
        line: &str,
        deadline: Instant,
        attempt: &mut DeliveryAttempt,
    ) -> Result<(), WireError> {
        attempt.advance(AttemptState::Connecting);
        let stream = connect_before(self.descriptor.endpoint(), deadline)?;
        set_deadline(&stream, deadline)?;
        attempt.advance(AttemptState::Connected);

        self.negotiate(&stream)?;

        set_deadline(&stream, deadline)?;
        let mut writer = &stream;
        writer.write_all(line.as_bytes())?;
        attempt.advance(AttemptState::Dispatched);
        writer.flush()?;
        let _ = stream.shutdown(Shutdown::Write);
        Ok(())
    }

    /// Send `hello` and wait (bounded by the socket timeouts) for the verdict.
    fn negotiate(&self, stream: &UnixStream) -> Result<(), WireError> {
        let hello = HandshakeFrame::Hello(Hello {
            service: self.descriptor.resolve_service_identity().clone(),
            contract: self.descriptor.build_interface_contract(),
        });
        let mut writer = stream;
        writer.write_all(to_ndjson(&hello)?.as_bytes())?;
        writer.flush()?;

        let mut reader = BufReader::new(stream);
        let reply = read_line_bounded(&mut reader, MAX_HELLO_LINE_BYTES)?;
        match parse_handshake_line(&reply)? {
            HandshakeFrame::HelloAck(ack) if ack.protocol_version == PROTOCOL_VERSION => Ok(()),
            HandshakeFrame::HelloAck(ack) => Err(WireError::ContractRefused(format!(
                "consumer acked protocol version {}",
                ack.protocol_version
            ))),
            HandshakeFrame::HelloNack(nack) => Err(WireError::ContractRefused(nack.reason)),
            other => Err(WireError::UnexpectedFrame {
                expected: "hello_ack",
                got: other.type_name().to_string(),
            }),
        }
    }
}

// ── Connection Helpers ──────────────────────────────────────

fn remaining(deadline: Instant) -> Result<Duration, WireError> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(io::Error::new(io::ErrorKind::TimedOut, "delivery deadline passed").into());
    }
    Ok(left)
}

fn set_deadline(stream: &UnixStream, deadline: Instant) -> Result<(), WireError> {
    let left = remaining(deadline)?;
    stream.set_read_timeout(Some(left))?;
    stream.set_write_timeout(Some(left))?;
    Ok(())
}

/// Connect to `path`, giving up at `deadline`.
///
/// `UnixStream` has no connect timeout, and connect can block when the
/// listener's backlog is full, so the connect runs on a helper thread. A
/// late connection is dropped by that thread.
fn connect_before(path: &Path, deadline: Instant) -> Result<UnixStream, WireError> {
    if !path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no endpoint at {}", path.display()),
        )
        .into());
    }
    let left = remaining(deadline)?;
    let target: PathBuf = path.to_path_buf();
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("notify-connect".to_string())
        .spawn(move || {
            let _ = tx.send(UnixStream::connect(&target));
        })?;
    match rx.recv_timeout(left) {
        Ok(result) => Ok(result?),
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out").into()),
    }
}

// ── Tests ───────────────────────────────────────────────────
