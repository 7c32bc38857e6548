use simpleip_bridge::simpleip::{
    ClientSettings, Command, Message, MessageType, Parameter, SimpleIpClient, SimpleIpListener,
};

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const PROBE_FRAME: &[u8; 24] = b"*SEPOWR################\n";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Message(Message),
    Error(String),
}

struct Recorder(tokio::sync::mpsc::UnboundedSender<Event>);

impl SimpleIpListener for Recorder {
    fn on_message(&self, _peer: &str, message: &Message) {
        let _ = self.0.send(Event::Message(*message));
    }

    fn on_connection_error(&self, _peer: &str, reason: &str) {
        let _ = self.0.send(Event::Error(reason.to_string()));
    }
}

/// Settings scaled down for tests; the keepalive is parked out of the way
/// unless a test wants it.
fn test_settings() -> ClientSettings {
    ClientSettings {
        connect_timeout: Duration::from_millis(1000),
        keepalive_initial_delay: Duration::from_secs(30),
        supervision_interval: Duration::from_secs(60),
        read_timeout_slack: Duration::from_secs(10),
        fast_retry_count: 3,
        fast_retry_delay: Duration::from_millis(50),
        slow_retry_delay: Duration::from_secs(30),
        reconnect_on_decode_error: true,
    }
}

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn client_with(port: u16, settings: ClientSettings) -> (SimpleIpClient, tokio::sync::mpsc::UnboundedReceiver<Event>) {
    let client = SimpleIpClient::with_settings("127.0.0.1", port, settings);
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    client.add_listener(Arc::new(Recorder(tx)));
    (client, rx)
}

async fn next_event(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn read_frame(sock: &mut TcpStream) -> [u8; 24] {
    let mut frame = [0u8; 24];
    tokio::time::timeout(Duration::from_secs(5), sock.read_exact(&mut frame))
        .await
        .expect("timed out waiting for frame")
        .expect("read failed");
    frame
}

#[tokio::test]
async fn dispatches_decoded_messages_in_order() {
    let (listener, port) = bind().await;
    let (client, mut rx) = client_with(port, test_settings());

    client.open().await.unwrap();
    let (mut sock, _) = listener.accept().await.unwrap();

    sock.write_all(b"*SNPOWR0000000000000001\n").await.unwrap();
    sock.write_all(b"*SNVOLU0000000000000031\n").await.unwrap();

    match next_event(&mut rx).await {
        Event::Message(message) => {
            assert_eq!(message.message_type, MessageType::Notify);
            assert_eq!(message.command, Command::PowerStatus);
            assert!(message.parameter.is_on());
        }
        other => panic!("unexpected event: {:?}", other),
    }
    match next_event(&mut rx).await {
        Event::Message(message) => {
            assert_eq!(message.command, Command::AudioVolume);
            assert_eq!(message.parameter.as_value().unwrap(), 31);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    client.close().await;
}

#[tokio::test]
async fn garbage_on_the_wire_is_survived() {
    let (listener, port) = bind().await;
    let (client, mut rx) = client_with(port, test_settings());

    client.open().await.unwrap();
    let (mut sock, _) = listener.accept().await.unwrap();

    sock.write_all(b"\x01\x02spurious bytes").await.unwrap();
    sock.write_all(b"*SAPOWR0000000000000000\n").await.unwrap();

    match next_event(&mut rx).await {
        Event::Message(message) => {
            assert_eq!(message.command, Command::PowerStatus);
            assert!(message.parameter.is_off());
        }
        other => panic!("unexpected event: {:?}", other),
    }

    client.close().await;
}

#[tokio::test]
async fn open_is_idempotent() {
    let (listener, port) = bind().await;
    let (client, _rx) = client_with(port, test_settings());

    client.open().await.unwrap();
    let _sock = listener.accept().await.unwrap();
    assert!(client.is_connected().await);
    client.open().await.unwrap();

    // no second connection was made
    let second = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(second.is_err());

    client.close().await;
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn send_connects_on_demand() {
    let (listener, port) = bind().await;
    let (client, _rx) = client_with(port, test_settings());

    client
        .control(Command::PowerStatus, Parameter::on())
        .await
        .unwrap();

    let (mut sock, _) = listener.accept().await.unwrap();
    assert_eq!(&read_frame(&mut sock).await, b"*SCPOWR0000000000000001\n");

    client.close().await;
}

#[tokio::test]
async fn connect_failure_reports_exactly_one_error() {
    // bind then drop to get a port nothing listens on
    let (listener, port) = bind().await;
    drop(listener);

    let (client, mut rx) = client_with(port, test_settings());
    assert!(client.open().await.is_err());

    match next_event(&mut rx).await {
        Event::Error(_) => {}
        other => panic!("unexpected event: {:?}", other),
    }
    // and only one
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn unknown_command_triggers_one_reconnect_and_a_probe() {
    let (listener, port) = bind().await;
    let (client, _rx) = client_with(port, test_settings());

    client.open().await.unwrap();
    let (mut sock, _) = listener.accept().await.unwrap();

    sock.write_all(b"*SAXXXX0000000000000000\n").await.unwrap();

    // the link is torn down and rebuilt once, then probed
    let (mut replacement, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("expected a reconnect")
        .unwrap();
    assert_eq!(&read_frame(&mut replacement).await, PROBE_FRAME);

    // exactly one reconnect for a single bad frame
    let another = tokio::time::timeout(Duration::from_millis(500), listener.accept()).await;
    assert!(another.is_err());

    client.close().await;
}

#[tokio::test]
async fn decode_error_policy_can_discard_instead() {
    let (listener, port) = bind().await;
    let settings = ClientSettings {
        reconnect_on_decode_error: false,
        ..test_settings()
    };
    let (client, mut rx) = client_with(port, settings);

    client.open().await.unwrap();
    let (mut sock, _) = listener.accept().await.unwrap();

    sock.write_all(b"*SAXXXX0000000000000000\n").await.unwrap();
    sock.write_all(b"*SAPOWR0000000000000001\n").await.unwrap();

    // the bad frame is dropped, the good one still arrives
    match next_event(&mut rx).await {
        Event::Message(message) => assert!(message.parameter.is_on()),
        other => panic!("unexpected event: {:?}", other),
    }

    // and the link stays up
    let reconnect = tokio::time::timeout(Duration::from_millis(500), listener.accept()).await;
    assert!(reconnect.is_err());

    client.close().await;
}

#[tokio::test]
async fn silent_link_is_reopened_and_probed() {
    let (listener, port) = bind().await;
    let settings = ClientSettings {
        // short supervision so the dead-link detector trips quickly; the
        // keepalive stays parked so nothing keeps the link alive
        supervision_interval: Duration::from_millis(200),
        read_timeout_slack: Duration::from_millis(100),
        ..test_settings()
    };
    let (client, _rx) = client_with(port, settings);

    client.open().await.unwrap();
    let _first = listener.accept().await.unwrap();

    // say nothing; after interval + slack the client reopens and probes
    let (mut replacement, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("expected a reconnect after silence")
        .unwrap();
    assert_eq!(&read_frame(&mut replacement).await, PROBE_FRAME);

    client.close().await;
}

#[tokio::test]
async fn keepalive_probes_periodically() {
    let (listener, port) = bind().await;
    let settings = ClientSettings {
        keepalive_initial_delay: Duration::from_millis(100),
        supervision_interval: Duration::from_millis(150),
        read_timeout_slack: Duration::from_secs(60),
        ..test_settings()
    };
    let (client, _rx) = client_with(port, settings);

    client.open().await.unwrap();
    let (mut sock, _) = listener.accept().await.unwrap();

    assert_eq!(&read_frame(&mut sock).await, PROBE_FRAME);
    assert_eq!(&read_frame(&mut sock).await, PROBE_FRAME);

    client.close().await;
}

#[tokio::test]
async fn closed_client_refuses_further_use() {
    let (listener, port) = bind().await;
    let (client, _rx) = client_with(port, test_settings());

    client.open().await.unwrap();
    let _sock = listener.accept().await.unwrap();

    client.close().await;
    // closing twice is fine
    client.close().await;

    assert!(client.open().await.is_err());
    assert!(client.enquire(Command::PowerStatus).await.is_err());
}

#[tokio::test]
async fn close_during_send_retry_does_not_resurrect_the_client() {
    let (listener, port) = bind().await;
    let settings = ClientSettings {
        // wide retry sleep so close() reliably lands inside it
        fast_retry_delay: Duration::from_millis(500),
        ..test_settings()
    };
    let (client, _rx) = client_with(port, settings);

    client.open().await.unwrap();
    let (sock, _) = listener.accept().await.unwrap();

    // leave the enquiry unread so dropping the socket resets the connection
    client.enquire(Command::PowerStatus).await.unwrap();
    drop(sock);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // this write fails against the reset socket and enters the retry sleep
    let racer = {
        let client = client.clone();
        tokio::spawn(async move { client.enquire(Command::PowerStatus).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.close().await;

    assert!(racer.await.unwrap().is_err());
    assert!(!client.is_connected().await);

    // the pending retry must not build a fresh connection after close
    let resurrected = tokio::time::timeout(Duration::from_secs(1), listener.accept()).await;
    assert!(resurrected.is_err());
}

#[tokio::test]
async fn panicking_listener_does_not_kill_the_receive_loop() {
    struct Panicker;
    impl SimpleIpListener for Panicker {
        fn on_message(&self, _peer: &str, _message: &Message) {
            panic!("listener blew up");
        }
        fn on_connection_error(&self, _peer: &str, _reason: &str) {}
    }

    let (listener, port) = bind().await;
    let (client, mut rx) = client_with(port, test_settings());
    client.add_listener(Arc::new(Panicker));

    client.open().await.unwrap();
    let (mut sock, _) = listener.accept().await.unwrap();

    sock.write_all(b"*SNPOWR0000000000000001\n").await.unwrap();
    sock.write_all(b"*SNPOWR0000000000000000\n").await.unwrap();

    // both messages still reach the well-behaved listener
    assert!(matches!(next_event(&mut rx).await, Event::Message(_)));
    assert!(matches!(next_event(&mut rx).await, Event::Message(_)));

    client.close().await;
}
