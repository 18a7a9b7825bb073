//! End-to-end dispatch tests over real loopback sockets: settings store in,
//! decoded datagrams out.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

use buttonbox_core::protocol::codec::decode_message;
use buttonbox_core::protocol::messages::{Command, ModifierFlags, PressKind, WireMessage};

use buttonbox_dispatch::application::dispatch_command::{
    DispatchError, DispatchOutcome, Dispatcher,
};
use buttonbox_dispatch::infrastructure::sender::{CommandSender, DatagramSender};
use buttonbox_dispatch::infrastructure::settings::{AppConfig, SettingsStore};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn tap(key: &str) -> Command {
    Command::KeyEvent {
        key: key.to_string(),
        modifiers: ModifierFlags::default(),
        press: PressKind::Tap,
    }
}

/// A settings store persisting into a fresh temp directory.
fn temp_store() -> (tempfile::TempDir, SettingsStore) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("config.toml");
    (dir, SettingsStore::new(AppConfig::default(), path))
}

async fn bind_receiver() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.expect("bind receiver")
}

async fn recv_message(socket: &UdpSocket) -> WireMessage {
    let mut buf = [0u8; 1024];
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("datagram within deadline")
        .expect("recv");
    let (message, consumed) = decode_message(&buf[..len]).expect("decode");
    assert_eq!(consumed, len, "datagram contains exactly one message");
    message
}

async fn assert_no_datagram(socket: &UdpSocket) {
    let mut buf = [0u8; 1024];
    let received = timeout(Duration::from_millis(200), socket.recv_from(&mut buf)).await;
    assert!(received.is_err(), "unexpected datagram arrived");
}

async fn next_outcome(rx: &mut mpsc::Receiver<DispatchOutcome>) -> DispatchOutcome {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("outcome within deadline")
        .expect("outcome channel open")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_configured_target_receives_decodable_command() {
    // Arrange: receiver socket + store pointing at it.
    let receiver = bind_receiver().await;
    let (_dir, mut store) = temp_store();
    store
        .set_target("127.0.0.1", receiver.local_addr().unwrap().port())
        .expect("set target");
    let (dispatcher, mut outcomes) =
        Dispatcher::new(store.resolver(), Arc::new(DatagramSender::new()));

    // Act
    dispatcher.dispatch(tap("w"));
    let outcome = next_outcome(&mut outcomes).await;

    // Assert: exactly one datagram that decodes back to the command.
    assert!(outcome.result.is_ok());
    assert_eq!(recv_message(&receiver).await, WireMessage::Command(tap("w")));
    assert_no_datagram(&receiver).await;
}

#[tokio::test]
async fn test_unset_target_fails_without_touching_network() {
    let (_dir, store) = temp_store();
    let sender = Arc::new(DatagramSender::new());
    let (dispatcher, mut outcomes) =
        Dispatcher::new(store.resolver(), sender.clone() as Arc<dyn CommandSender>);

    dispatcher.dispatch(tap("w"));
    let outcome = next_outcome(&mut outcomes).await;

    assert!(matches!(
        outcome.result,
        Err(DispatchError::UnresolvedEndpoint)
    ));
    // No socket was ever bound.
    assert!(!sender.is_open().await);
}

#[tokio::test]
async fn test_target_edit_redirects_subsequent_commands() {
    let first = bind_receiver().await;
    let second = bind_receiver().await;
    let (_dir, mut store) = temp_store();
    store
        .set_target("127.0.0.1", first.local_addr().unwrap().port())
        .unwrap();
    let (dispatcher, mut outcomes) =
        Dispatcher::new(store.resolver(), Arc::new(DatagramSender::new()));

    dispatcher.dispatch(tap("w"));
    next_outcome(&mut outcomes).await;
    store
        .set_target("127.0.0.1", second.local_addr().unwrap().port())
        .unwrap();
    dispatcher.dispatch(tap("s"));
    next_outcome(&mut outcomes).await;

    assert_eq!(recv_message(&first).await, WireMessage::Command(tap("w")));
    assert_eq!(recv_message(&second).await, WireMessage::Command(tap("s")));
    assert_no_datagram(&first).await;
}

#[tokio::test]
async fn test_burst_of_commands_arrives_in_dispatch_order() {
    let receiver = bind_receiver().await;
    let (_dir, mut store) = temp_store();
    store
        .set_target("127.0.0.1", receiver.local_addr().unwrap().port())
        .unwrap();
    let (dispatcher, mut outcomes) =
        Dispatcher::new(store.resolver(), Arc::new(DatagramSender::new()));

    let commands = vec![
        tap("w"),
        Command::HoldStart {
            key: "b".to_string(),
            modifiers: ModifierFlags(ModifierFlags::LEFT_SHIFT),
        },
        Command::Axis {
            axis: 2,
            value: -12345,
        },
        Command::MacroInvoke {
            macro_id: "Flight.Boost".to_string(),
        },
        Command::HoldStop {
            key: "b".to_string(),
        },
    ];
    for command in &commands {
        dispatcher.dispatch(command.clone());
    }
    for _ in &commands {
        next_outcome(&mut outcomes).await;
    }

    // Loopback delivers in send order, so arrival order checks local
    // ordering of the dispatch queue.
    for expected in commands {
        assert_eq!(recv_message(&receiver).await, WireMessage::Command(expected));
    }
}

#[tokio::test]
async fn test_shutdown_then_fresh_dispatcher_still_delivers() {
    let receiver = bind_receiver().await;
    let (_dir, mut store) = temp_store();
    store
        .set_target("127.0.0.1", receiver.local_addr().unwrap().port())
        .unwrap();

    let first_sender = Arc::new(DatagramSender::new());
    let (first, mut first_outcomes) =
        Dispatcher::new(store.resolver(), first_sender.clone() as Arc<dyn CommandSender>);
    first.dispatch(tap("w"));
    next_outcome(&mut first_outcomes).await;
    let worker = first.shutdown().expect("worker handle");
    worker.await.expect("worker exit");
    assert!(!first_sender.is_open().await, "socket released on shutdown");

    let (second, mut outcomes) =
        Dispatcher::new(store.resolver(), Arc::new(DatagramSender::new()));
    second.dispatch(tap("s"));
    let outcome = next_outcome(&mut outcomes).await;

    assert!(outcome.result.is_ok());
    assert_eq!(recv_message(&receiver).await, WireMessage::Command(tap("w")));
    assert_eq!(recv_message(&receiver).await, WireMessage::Command(tap("s")));
}

#[tokio::test]
async fn test_transport_failure_reports_but_does_not_wedge() {
    let receiver = bind_receiver().await;
    let (_dir, mut store) = temp_store();
    // A host that cannot resolve produces a transport error per send.
    store.set_target("no-such-host.invalid", 5055).unwrap();
    let (dispatcher, mut outcomes) =
        Dispatcher::new(store.resolver(), Arc::new(DatagramSender::new()));

    dispatcher.dispatch(tap("w"));
    let outcome = next_outcome(&mut outcomes).await;
    assert!(matches!(outcome.result, Err(DispatchError::Send(_))));

    // Recovery: point at a real receiver and the next command flows.
    store
        .set_target("127.0.0.1", receiver.local_addr().unwrap().port())
        .unwrap();
    dispatcher.dispatch(tap("s"));
    let outcome = next_outcome(&mut outcomes).await;

    assert!(outcome.result.is_ok());
    assert_eq!(recv_message(&receiver).await, WireMessage::Command(tap("s")));
}
