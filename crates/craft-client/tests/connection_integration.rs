//! End-to-end tests of `Connection` against a real TCP listener on loopback.

use std::time::Duration;

use craft_client::infrastructure::network::{Connection, ConnectionConfig, Event, EventName, Phase};
use craft_core::Field;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn bind() -> (TcpListener, ConnectionConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = ConnectionConfig {
        reconnect_delay: Duration::from_millis(50),
        ..ConnectionConfig::new("127.0.0.1", port)
    };
    (listener, config)
}

async fn wait_for(events: &mut UnboundedReceiver<Event>, name: EventName) -> Event {
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if event.name() == name {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {name:?}"))
}

#[tokio::test]
async fn test_receives_typed_position_update_over_tcp() {
    // Arrange
    let (listener, config) = bind().await;
    let conn = Connection::open(config, None);
    let mut events = conn.listen();
    let (mut socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    wait_for(&mut events, EventName::Connect).await;

    // Act
    socket.write_all(b"U,1,2.0,3.0,4.0,5.0,6.0\n").await.unwrap();

    // Assert
    match wait_for(&mut events, EventName::Command('U')).await {
        Event::Command(msg) => {
            assert_eq!(msg.fields[0], Field::Integer(1));
            assert_eq!(msg.fields[5], Field::Float(6.0));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(conn.phase(), Phase::Connected);
}

#[tokio::test]
async fn test_reconnect_handler_identifies_again_after_server_drop() {
    // Arrange
    let (listener, config) = bind().await;
    let conn = Connection::open(config, None);
    let outbox = conn.outbox();
    conn.subscribe(EventName::Reconnect, move |_| outbox.send('A', ["bob", "secret"]));
    let mut events = conn.listen();

    let (first, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    wait_for(&mut events, EventName::Connect).await;
    drop(first);
    wait_for(&mut events, EventName::Close).await;

    // Act
    let (second, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut reader = BufReader::new(second);
    let mut line = String::new();
    timeout(WAIT, reader.read_line(&mut line)).await.unwrap().unwrap();

    // Assert
    assert_eq!(line, "A,bob,secret\n");
}

#[tokio::test]
async fn test_queued_send_reaches_server_once_it_accepts() {
    let (listener, config) = bind().await;
    let conn = Connection::open(config, None);

    conn.send('T', ["hello"]);
    conn.send('K', [0, 0, 0]);
    let (socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let mut reader = BufReader::new(socket);

    let mut first = String::new();
    let mut second = String::new();
    timeout(WAIT, reader.read_line(&mut first)).await.unwrap().unwrap();
    timeout(WAIT, reader.read_line(&mut second)).await.unwrap().unwrap();
    assert_eq!(first, "T,hello\n");
    assert_eq!(second, "K,0,0,0\n");
}

#[tokio::test]
async fn test_unreachable_server_reports_error_then_close() {
    let (listener, config) = bind().await;
    drop(listener);
    let conn = Connection::open(config, None);
    let mut events = conn.listen();

    let error = wait_for(&mut events, EventName::Error).await;
    let next = timeout(WAIT, events.recv()).await.unwrap().unwrap();

    assert!(matches!(error, Event::Error(_)));
    assert_eq!(next.name(), EventName::Close);
    conn.close();
    assert!(conn.is_closed());
}

#[tokio::test]
async fn test_close_shuts_the_socket() {
    let (listener, config) = bind().await;
    let conn = Connection::open(config, None);
    let mut events = conn.listen();
    let (socket, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    wait_for(&mut events, EventName::Connect).await;

    conn.close();

    let mut reader = BufReader::new(socket);
    let mut line = String::new();
    let read = timeout(WAIT, reader.read_line(&mut line)).await.unwrap().unwrap();
    assert_eq!(read, 0, "server must observe EOF after close()");
    assert!(timeout(Duration::from_millis(200), listener.accept()).await.is_err());
}
