//! End-to-end tests over plain TCP: connect, echo, broadcast, disconnect
//! and teardown behavior of the server's dispatch model.

use std::time::Duration;

use bytes::Bytes;
use framewire::{Client, Connection, Handler, NetError, NetResult, Server, ServerConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Debug)]
enum Event {
    Connected(Client),
    Message(u64, Bytes),
    Disconnected(u64),
}

/// Records every callback on a channel; echoes messages back when asked to.
struct RecordingHandler {
    events: mpsc::UnboundedSender<Event>,
    echo: bool,
}

impl Handler for RecordingHandler {
    async fn client_connected(&self, client: Client) {
        let _ = self.events.send(Event::Connected(client));
    }

    async fn client_communicated(&self, payload: Bytes, client: Client) {
        if self.echo {
            client.send(&payload).await.expect("echo send");
        }
        let _ = self.events.send(Event::Message(client.id(), payload));
    }

    async fn client_disconnected(&self, client: Client) {
        let _ = self.events.send(Event::Disconnected(client.id()));
    }
}

async fn start_server(
    echo: bool,
) -> NetResult<(Server<RecordingHandler>, mpsc::UnboundedReceiver<Event>)> {
    let (events, rx) = mpsc::unbounded_channel();
    let handler = RecordingHandler { events, echo };
    let server = Server::bind(ServerConfig::default(), handler).await?;
    Ok((server, rx))
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for server event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_echo_round_trip() -> NetResult<()> {
    let (server, mut events) = start_server(true).await?;
    let port = server.local_addr().port();

    let client = Connection::connect("127.0.0.1", port).await?;
    let written = client.send(b"Hello, world!").await?;
    assert_eq!(written, 12 + 13 + 4);

    // connected fires before the first message for the same client
    assert!(matches!(next_event(&mut events).await, Event::Connected(_)));
    match next_event(&mut events).await {
        Event::Message(_, payload) => assert_eq!(&payload[..], b"Hello, world!"),
        other => panic!("expected message event, got {:?}", other),
    }

    let echoed = client.receive().await?.unwrap();
    assert_eq!(&echoed[..], b"Hello, world!");

    client.close().await?;
    server.close().await;
    Ok(())
}

#[tokio::test]
async fn test_empty_payload_round_trip() -> NetResult<()> {
    let (server, _events) = start_server(true).await?;
    let port = server.local_addr().port();

    let client = Connection::connect("127.0.0.1", port).await?;
    client.send(b"").await?;
    let echoed = client.receive().await?.unwrap();
    assert!(echoed.is_empty());

    client.close().await?;
    server.close().await;
    Ok(())
}

#[tokio::test]
async fn test_corrupted_frame_not_delivered() -> NetResult<()> {
    let (server, mut events) = start_server(false).await?;
    let port = server.local_addr().port();

    let mut raw = TcpStream::connect(("127.0.0.1", port)).await?;

    // one frame with a flipped payload byte, then an intact one
    let mut corrupted = framewire::Frame::encode(b"poisoned").unwrap();
    corrupted[14] ^= 0x01;
    raw.write_all(&corrupted).await?;
    raw.write_all(&framewire::Frame::encode(b"survivor").unwrap())
        .await?;
    raw.flush().await?;

    assert!(matches!(next_event(&mut events).await, Event::Connected(_)));
    // the corrupted frame is dropped; only the intact one reaches the handler
    match next_event(&mut events).await {
        Event::Message(_, payload) => assert_eq!(&payload[..], b"survivor"),
        other => panic!("expected the intact message, got {:?}", other),
    }

    server.close().await;
    Ok(())
}

#[tokio::test]
async fn test_abrupt_disconnect_fires_once() -> NetResult<()> {
    let (server, mut events) = start_server(false).await?;
    let port = server.local_addr().port();

    let client = Connection::connect("127.0.0.1", port).await?;
    let connected = match next_event(&mut events).await {
        Event::Connected(c) => c,
        other => panic!("expected connected event, got {:?}", other),
    };
    assert_eq!(server.client_count(), 1);

    client.close().await?;

    match next_event(&mut events).await {
        Event::Disconnected(id) => assert_eq!(id, connected.id()),
        other => panic!("expected disconnected event, got {:?}", other),
    }
    // exactly once: no further events arrive
    assert!(
        timeout(Duration::from_millis(200), events.recv())
            .await
            .is_err()
    );
    // the callback fires before the registry entry is dropped; give the
    // dispatch loop a moment to finish unregistering
    for _ in 0..50 {
        if server.client_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.client_count(), 0);

    server.close().await;
    Ok(())
}

#[tokio::test]
async fn test_broadcast_reaches_all_clients() -> NetResult<()> {
    let (server, mut events) = start_server(false).await?;
    let port = server.local_addr().port();

    let mut clients = Vec::new();
    let mut handles = Vec::new();
    for _ in 0..3 {
        clients.push(Connection::connect("127.0.0.1", port).await?);
        match next_event(&mut events).await {
            Event::Connected(c) => handles.push(c),
            other => panic!("expected connected event, got {:?}", other),
        }
    }
    assert_eq!(server.client_count(), 3);

    server.send_all(b"fanout").await;
    for client in &clients {
        let received = client.receive().await?.unwrap();
        assert_eq!(&received[..], b"fanout");
    }

    // removing one client must not affect delivery to the rest
    server.remove(&handles[1]).await?;
    assert_eq!(server.client_count(), 2);
    server.send_all(b"again").await;
    for (i, client) in clients.iter().enumerate() {
        if i == 1 {
            continue;
        }
        let received = client.receive().await?.unwrap();
        assert_eq!(&received[..], b"again");
    }

    // the removed client sees end-of-stream
    let gone = clients[1].receive().await;
    assert!(matches!(gone, Ok(None) | Err(NetError::Io(_))));

    server.close().await;
    Ok(())
}

#[tokio::test]
async fn test_removing_one_client_leaves_others_flowing() -> NetResult<()> {
    let (server, mut events) = start_server(true).await?;
    let port = server.local_addr().port();

    let first = Connection::connect("127.0.0.1", port).await?;
    let first_handle = match next_event(&mut events).await {
        Event::Connected(c) => c,
        other => panic!("expected connected event, got {:?}", other),
    };
    let second = Connection::connect("127.0.0.1", port).await?;
    assert!(matches!(next_event(&mut events).await, Event::Connected(_)));

    // both clients exchange messages independently
    first.send(b"one").await?;
    assert_eq!(&first.receive().await?.unwrap()[..], b"one");
    second.send(b"two").await?;
    assert_eq!(&second.receive().await?.unwrap()[..], b"two");

    server.remove(&first_handle).await?;

    // the survivor keeps exchanging messages
    second.send(b"still here").await?;
    assert_eq!(&second.receive().await?.unwrap()[..], b"still here");

    server.close().await;
    Ok(())
}

#[tokio::test]
async fn test_server_close_is_idempotent() -> NetResult<()> {
    let (server, _events) = start_server(false).await?;
    let port = server.local_addr().port();
    let client = Connection::connect("127.0.0.1", port).await?;

    server.close().await;
    server.close().await;

    // the client observes the server-initiated close
    let result = client.receive().await;
    assert!(matches!(result, Ok(None) | Err(NetError::Io(_))));
    Ok(())
}

#[tokio::test]
async fn test_closed_port_is_released() -> NetResult<()> {
    let (server, _events) = start_server(false).await?;
    let addr = server.local_addr();
    server.close().await;

    // the listening socket is gone; a fresh server can take the port
    let (rebound, _events) = {
        let (events, rx) = mpsc::unbounded_channel();
        let handler = RecordingHandler {
            events,
            echo: false,
        };
        let config = ServerConfig {
            port: addr.port(),
            ..ServerConfig::default()
        };
        (Server::bind(config, handler).await?, rx)
    };
    assert_eq!(rebound.local_addr().port(), addr.port());
    rebound.close().await;
    Ok(())
}
