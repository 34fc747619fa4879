//! Consumer endpoint: the UI agent's side of the notification channel.
//!
//! Binds the socket resolved from the channel descriptor, accepts relay
//! connections, enforces the contract, and hands decoded notifications to
//! the agent through a channel.
//!
//! Every peer is treated as untrusted: lines are size-capped, sockets carry
//! I/O timeouts, the contract must match exactly, and payloads outside the
//! allow-list are never decoded.

use std::io::{self, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::contract::{ChannelDescriptor, PROTOCOL_VERSION};
use super::wire::{
    decode_post_frame, parse_handshake_line, read_line_bounded, to_ndjson, HandshakeFrame,
    HelloAck, HelloNack, ReceivedNotification, MAX_FRAME_LINE_BYTES, MAX_HELLO_LINE_BYTES,
};
use crate::error::{ChannelError, WireError};

// ── Constants ───────────────────────────────────────────────

/// Poll interval of the accept loop when no relay is connecting.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Read/write timeout on an accepted connection.
const CONNECTION_IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Connections handled at once. Extra connections are closed immediately.
const MAX_CONCURRENT_CONNECTIONS: usize = 32;

// ── Listener ────────────────────────────────────────────────

/// Handle for the consumer endpoint.
///
/// Dropping it stops the accept loop and removes the socket file.
pub struct NotificationListener {
    received_rx: Receiver<ReceivedNotification>,
    shutdown: Arc<AtomicBool>,
    socket_path: PathBuf,
    listener_handle: Option<thread::JoinHandle<()>>,
}

impl NotificationListener {
    /// Bind the endpoint named by `descriptor` and start accepting.
    ///
    /// A stale socket file at the endpoint path is removed first. The new
    /// socket is chmod 600 (owner-only).
    pub fn bind(descriptor: Arc<ChannelDescriptor>) -> Result<Self, ChannelError> {
        let path = descriptor.endpoint().to_path_buf();

        if path.exists() {
            info!(path = %path.display(), "[IPC] removing stale socket");
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;

        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        listener.set_nonblocking(true)?;

        info!(
            service = %descriptor.resolve_service_identity(),
            path = %path.display(),
            "[IPC] listening for notifications"
        );

        let (received_tx, received_rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);

        let listener_handle = thread::Builder::new()
            .name("notify-listener".to_string())
            .spawn(move || {
                Self::listener_loop(listener, descriptor, received_tx, shutdown_flag);
            })?;

        Ok(Self {
            received_rx,
            shutdown,
            socket_path: path,
            listener_handle: Some(listener_handle),
        })
    }

    pub fn endpoint(&self) -> &Path {
        &self.socket_path
    }

    /// Wait up to `timeout` for the next notification.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ReceivedNotification> {
        match self.received_rx.recv_timeout(timeout) {
            Ok(n) => Some(n),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Next notification if one is already waiting.
    pub fn try_recv(&self) -> Option<ReceivedNotification> {
        match self.received_rx.try_recv() {
            Ok(n) => Some(n),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block until the next notification. `None` once the listener stops.
    pub fn recv(&self) -> Option<ReceivedNotification> {
        self.received_rx.recv().ok()
    }

    /// Accept loop: one handler thread per relay connection.
    fn listener_loop(
        listener: UnixListener,
        descriptor: Arc<ChannelDescriptor>,
        received_tx: Sender<ReceivedNotification>,
        shutdown: Arc<AtomicBool>,
    ) {
        let active = Arc::new(AtomicUsize::new(0));
        while !shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    if active.load(Ordering::Acquire) >= MAX_CONCURRENT_CONNECTIONS {
                        warn!("[IPC_BUSY] connection limit reached, dropping relay connection");
                        continue;
                    }
                    active.fetch_add(1, Ordering::AcqRel);

                    let descriptor = Arc::clone(&descriptor);
                    let tx = received_tx.clone();
                    let active_for_handler = Arc::clone(&active);
                    let spawned = thread::Builder::new()
                        .name("notify-conn".to_string())
                        .spawn(move || {
                            Self::handle_connection(stream, &descriptor, &tx);
                            active_for_handler.fetch_sub(1, Ordering::AcqRel);
                        });
                    if let Err(e) = spawned {
                        active.fetch_sub(1, Ordering::AcqRel);
                        warn!("[IPC] failed to spawn connection handler: {e}");
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    warn!("[IPC] accept error: {e}");
                    thread::sleep(POLL_INTERVAL * 10);
                }
            }
        }
        debug!("[IPC] listener loop stopped");
    }

    /// Run one connection to completion and log how it ended.
    fn handle_connection(
        stream: UnixStream,
        descriptor: &ChannelDescriptor,
        received_tx: &Sender<ReceivedNotification>,
    ) {
        match serve_connection(&stream, descriptor) {
            Ok(received) => {
                debug!(
                    id = %received.id,
                    payload_type = %received.notification.kind(),
                    "[IPC] notification received"
                );
                // The agent may have stopped reading; nothing else to do then.
                let _ = received_tx.send(received);
            }
            Err(e) if e.is_protocol_violation() => {
                warn!(code = e.code(), "[IPC_PROTOCOL_VIOLATION] {e}, dropping relay");
            }
            Err(WireError::ContractRefused(reason)) => {
                warn!("[IPC_CONTRACT_REFUSED] {reason}");
            }
            Err(e) => {
                debug!(code = e.code(), "[IPC] connection ended: {e}");
            }
        }
    }
}

impl Drop for NotificationListener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.join();
        }
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
            debug!(path = %self.socket_path.display(), "[IPC] cleaned up socket");
        }
    }
}

/// Handshake then read exactly one notification.
fn serve_connection(
    stream: &UnixStream,
    descriptor: &ChannelDescriptor,
) -> Result<ReceivedNotification, WireError> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CONNECTION_IO_TIMEOUT))?;
    stream.set_write_timeout(Some(CONNECTION_IO_TIMEOUT))?;

    let mut reader = BufReader::new(stream);
    let line = read_line_bounded(&mut reader, MAX_HELLO_LINE_BYTES)?;
    let hello = match parse_handshake_line(&line)? {
        HandshakeFrame::Hello(hello) => hello,
        other => {
            return Err(WireError::UnexpectedFrame {
                expected: "hello",
                got: other.type_name().to_string(),
            })
        }
    };

    let identity = descriptor.resolve_service_identity();
    let refusal = if &hello.service != identity {
        Some(format!(
            "service {} does not match {}",
            hello.service, identity
        ))
    } else {
        descriptor.contract().mismatch_reason(&hello.contract)
    };

    let mut writer = stream;
    if let Some(reason) = refusal {
        let nack = HandshakeFrame::HelloNack(HelloNack {
            reason: reason.clone(),
        });
        writer.write_all(to_ndjson(&nack)?.as_bytes())?;
        writer.flush()?;
        return Err(WireError::ContractRefused(reason));
    }

    let ack = HandshakeFrame::HelloAck(HelloAck {
        protocol_version: PROTOCOL_VERSION,
    });
    writer.write_all(to_ndjson(&ack)?.as_bytes())?;
    writer.flush()?;

    let line = read_line_bounded(&mut reader, MAX_FRAME_LINE_BYTES)?;
    decode_post_frame(&line, descriptor.contract())
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::contract::{InterfaceContract, ServiceIdentity};
    use crate::ipc::wire::Hello;
    use std::io::BufRead;

    fn descriptor_in(dir: &Path) -> Arc<ChannelDescriptor> {
        let id = ServiceIdentity::new("dev.test.notifier").unwrap();
        Arc::new(ChannelDescriptor::new(id, dir, InterfaceContract::current()).unwrap())
    }

    #[test]
    fn bind_sets_owner_only_mode_and_drop_removes_socket() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let listener = NotificationListener::bind(descriptor_in(tmp.path())).unwrap();
        let path = listener.endpoint().to_path_buf();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        drop(listener);
        assert!(!path.exists());
    }

    #[test]
    fn bind_replaces_stale_socket_file() {
        let tmp = tempfile::tempdir().unwrap();
        let descriptor = descriptor_in(tmp.path());
        std::fs::write(descriptor.endpoint(), b"stale").unwrap();
        let listener = NotificationListener::bind(descriptor).unwrap();
        assert!(UnixStream::connect(listener.endpoint()).is_ok());
    }

    #[test]
    fn wrong_service_gets_nack() {
        let tmp = tempfile::tempdir().unwrap();
        let listener = NotificationListener::bind(descriptor_in(tmp.path())).unwrap();
        let stream = UnixStream::connect(listener.endpoint()).unwrap();
        let hello = HandshakeFrame::Hello(Hello {
            service: ServiceIdentity::new("dev.other.notifier").unwrap(),
            contract: InterfaceContract::current(),
        });
        (&stream)
            .write_all(to_ndjson(&hello).unwrap().as_bytes())
            .unwrap();
        let mut reply = String::new();
        BufReader::new(&stream).read_line(&mut reply).unwrap();
        let frame = parse_handshake_line(reply.trim_end()).unwrap();
        assert_eq!(frame.type_name(), "hello_nack");
        assert!(listener.try_recv().is_none());
    }

    #[test]
    fn garbage_first_line_gets_no_reply() {
        let tmp = tempfile::tempdir().unwrap();
        let listener = NotificationListener::bind(descriptor_in(tmp.path())).unwrap();
        let stream = UnixStream::connect(listener.endpoint()).unwrap();
        (&stream).write_all(b"not json\n").unwrap();
        let mut reply = String::new();
        let n = BufReader::new(&stream).read_line(&mut reply).unwrap();
        assert_eq!(n, 0, "listener must close without replying, got {reply:?}");
    }
}
