//! N2: Contract and allow-list enforcement tests.
//!
//! Proves:
//! 1. A payload kind outside the producer's allow-list is `Rejected` and no
//!    connection is attempted (no bytes sent)
//! 2. A consumer with a different contract refuses the handshake; the relay
//!    sees `ConsumerUnavailable` and nothing is decoded
//! 3. A hostile peer cannot get a non-allow-listed payload decoded, and the
//!    listener keeps serving honest relays afterwards

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::time::Duration;

use block_notifier::ipc::contract::PROTOCOL_VERSION;
use block_notifier::ipc::wire::{parse_handshake_line, to_ndjson, HandshakeFrame, Hello};
use block_notifier::{
    BlockEvent, ChannelDescriptor, DeliveryOutcome, DeviceBlockEvent, InterfaceContract,
    Notification, NotificationListener, PayloadKind, Relay, ServiceIdentity,
};

// ── Helpers ─────────────────────────────────────────────────

const TIMEOUT: Duration = Duration::from_millis(300);

fn descriptor_with(
    dir: &tempfile::TempDir,
    contract: InterfaceContract,
) -> Arc<ChannelDescriptor> {
    let id = ServiceIdentity::new("dev.test.notifier").unwrap();
    Arc::new(ChannelDescriptor::new(id, dir.path(), contract).unwrap())
}

fn block_only() -> InterfaceContract {
    InterfaceContract::new(PROTOCOL_VERSION, [PayloadKind::BlockEvent]).unwrap()
}

/// Connect as a raw peer and complete the handshake with `contract`.
fn raw_handshake(descriptor: &ChannelDescriptor, contract: InterfaceContract) -> UnixStream {
    let stream = UnixStream::connect(descriptor.endpoint()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let hello = HandshakeFrame::Hello(Hello {
        service: descriptor.resolve_service_identity().clone(),
        contract,
    });
    (&stream)
        .write_all(to_ndjson(&hello).unwrap().as_bytes())
        .unwrap();
    let mut reply = String::new();
    BufReader::new(&stream).read_line(&mut reply).unwrap();
    let frame = parse_handshake_line(reply.trim_end()).unwrap();
    assert_eq!(frame.type_name(), "hello_ack");
    stream
}

/// True once the peer has closed its side of `stream`. A close with unread
/// data may surface as a reset instead of EOF.
fn peer_closed(stream: &UnixStream) -> bool {
    let mut buf = String::new();
    match BufReader::new(stream).read_line(&mut buf) {
        Ok(0) => true,
        Err(e) => matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::BrokenPipe),
        Ok(_) => false,
    }
}

// ── 1. Producer-side allow-list ─────────────────────────────

#[test]
fn disallowed_payload_is_rejected_without_connecting() {
    let tmp = tempfile::tempdir().unwrap();
    let descriptor = descriptor_with(&tmp, block_only());

    // A raw socket at the endpoint lets us observe connection attempts.
    let observer = UnixListener::bind(descriptor.endpoint()).unwrap();
    observer.set_nonblocking(true).unwrap();

    let relay = Relay::new(descriptor, TIMEOUT);
    let outcome = relay.post_notification(&DeviceBlockEvent::new("disk4s1").into());
    assert_eq!(outcome, DeliveryOutcome::Rejected);

    match observer.accept() {
        Err(e) => assert_eq!(e.kind(), ErrorKind::WouldBlock),
        Ok(_) => panic!("relay connected for a rejected payload"),
    }
}

#[test]
fn allowed_payload_still_delivered_on_narrow_contract() {
    let tmp = tempfile::tempdir().unwrap();
    let descriptor = descriptor_with(&tmp, block_only());
    let listener = NotificationListener::bind(Arc::clone(&descriptor)).unwrap();
    let relay = Relay::new(descriptor, TIMEOUT);

    let event: Notification = BlockEvent::new("proc-123").into();
    assert_eq!(relay.post_notification(&event), DeliveryOutcome::Delivered);
    assert_eq!(
        listener
            .recv_timeout(Duration::from_secs(2))
            .unwrap()
            .notification,
        event
    );
}

// ── 2. Contract negotiation ─────────────────────────────────

#[test]
fn contract_mismatch_is_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    // Consumer built with a narrower contract than the producer publishes.
    let consumer = descriptor_with(&tmp, block_only());
    let listener = NotificationListener::bind(consumer).unwrap();

    let producer = descriptor_with(&tmp, InterfaceContract::current());
    let relay = Relay::new(producer, TIMEOUT);

    let outcome = relay.post_notification(&BlockEvent::new("proc-123").into());
    assert_eq!(outcome, DeliveryOutcome::ConsumerUnavailable);
    assert!(listener.recv_timeout(Duration::from_millis(300)).is_none());
}

// ── 3. Hostile peers ────────────────────────────────────────

#[test]
fn undeclared_payload_type_is_never_decoded() {
    let tmp = tempfile::tempdir().unwrap();
    let descriptor = descriptor_with(&tmp, block_only());
    let listener = NotificationListener::bind(Arc::clone(&descriptor)).unwrap();

    let stream = raw_handshake(&descriptor, block_only());
    let frame = r#"{"type":"post_notification","id":"x","ts_ms":0,"payload_type":"device_block_event","payload":{"device_descriptor":"disk4","blocked_at_ms":1}}"#;
    (&stream).write_all(frame.as_bytes()).unwrap();
    (&stream).write_all(b"\n").unwrap();

    assert!(peer_closed(&stream));
    assert!(listener.recv_timeout(Duration::from_millis(300)).is_none());
}

#[test]
fn oversize_frame_drops_peer() {
    let tmp = tempfile::tempdir().unwrap();
    let descriptor = descriptor_with(&tmp, InterfaceContract::current());
    let listener = NotificationListener::bind(Arc::clone(&descriptor)).unwrap();

    let stream = raw_handshake(&descriptor, InterfaceContract::current());
    let huge = vec![b'x'; 128 * 1024];
    // The listener may close before we finish writing; that is the point.
    let _ = (&stream).write_all(&huge);

    assert!(peer_closed(&stream));
    assert!(listener.recv_timeout(Duration::from_millis(300)).is_none());
}

#[test]
fn listener_survives_hostile_peer() {
    let tmp = tempfile::tempdir().unwrap();
    let descriptor = descriptor_with(&tmp, InterfaceContract::current());
    let listener = NotificationListener::bind(Arc::clone(&descriptor)).unwrap();

    {
        let stream = UnixStream::connect(descriptor.endpoint()).unwrap();
        (&stream)
            .write_all(b"{\"type\":\"exec\",\"cmd\":\"/bin/sh\"}\n")
            .unwrap();
    }

    let relay = Relay::new(Arc::clone(&descriptor), TIMEOUT);
    let event: Notification = BlockEvent::new("proc-after-attack").into();
    assert_eq!(relay.post_notification(&event), DeliveryOutcome::Delivered);
    let received = listener.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(received.notification, event);
}
