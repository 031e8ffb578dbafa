//! End-to-end tests for tagfs-gateway.
//!
//! Runs the full relay against an in-process record store (or a plain
//! echo process) and real WebSocket clients.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tagfs_gateway::{Backend, BackendCommand, Gateway, GatewayConfig, GatewayStats, WebSocketServer};
use tagfs_store::RecordStore;
use tokio::io::{AsyncReadExt, BufReader, duplex};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, client_async, connect_async, tungstenite::Message,
};

const WAIT: Duration = Duration::from_secs(5);

/// Test client that connects to the gateway.
struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let url = format!("ws://{}", addr);
        let (ws, _) = connect_async(&url).await.expect("Failed to connect");
        Self { ws }
    }

    /// Connect and wait until the gateway has registered us.
    async fn connect_ready(addr: SocketAddr) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(r#"{"action":"LIST","id":"ready:0"}"#).await;
        client.recv_until(|v| v["id"] == "ready:0").await;
        client
    }

    async fn send(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .expect("Failed to send message");
    }

    /// Receive one text message.
    async fn recv_text(&mut self) -> String {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(Message::Binary(data))) => return String::from_utf8_lossy(&data).into_owned(),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => panic!("Connection closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {}", e),
                None => panic!("Stream ended unexpectedly"),
                _ => continue,
            }
        }
    }

    async fn recv_text_timeout(&mut self, duration: Duration) -> Result<String, &'static str> {
        match timeout(duration, self.recv_text()).await {
            Ok(text) => Ok(text),
            Err(_) => Err("Timeout waiting for message"),
        }
    }

    /// Receive JSON messages until one matches, skipping the rest.
    async fn recv_until(&mut self, pred: impl Fn(&Value) -> bool) -> Value {
        let result = timeout(WAIT, async {
            loop {
                let text = self.recv_text().await;
                let value: Value = serde_json::from_str(&text).expect("Expected JSON");
                if pred(&value) {
                    return value;
                }
            }
        })
        .await;
        result.expect("Timeout waiting for matching message")
    }

    async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct RunningGateway {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<GatewayStats>,
}

impl RunningGateway {
    async fn start(backend: Backend) -> Self {
        Self::start_with(GatewayConfig::new(BackendCommand::new("in-process")), backend).await
    }

    async fn start_with(config: GatewayConfig, backend: Backend) -> Self {
        let listener = WebSocketServer::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");
        let (stop, stopped) = oneshot::channel();

        let task = tokio::spawn(Gateway::new(&config, backend).run(listener, async move {
            let _ = stopped.await;
        }));
        Self { addr, stop, task }
    }

    async fn stop(self) -> GatewayStats {
        let _ = self.stop.send(());
        timeout(WAIT, self.task)
            .await
            .expect("Gateway did not stop")
            .expect("Gateway task panicked")
    }
}

/// Backend wired to an in-process record store.
fn store_backend() -> Backend {
    let (to_store, store_in) = duplex(64 * 1024);
    let (store_out, from_store) = duplex(64 * 1024);
    tokio::spawn(async move {
        let mut store = RecordStore::new();
        let _ = tagfs_store::serve(&mut store, BufReader::new(store_in), store_out).await;
    });
    Backend::from_io(to_store, from_store)
}

// ============================================================================
// Relay Tests
// ============================================================================

#[tokio::test]
async fn test_request_reaches_store_and_response_returns() {
    let gateway = RunningGateway::start(store_backend()).await;
    let mut client = TestClient::connect(gateway.addr).await;

    client.send(r#"{"action":"WRITE","file":"x.txt","data":"hi"}"#).await;
    let ack = client.recv_until(|v| v.get("file").is_some()).await;
    assert_eq!(ack["message"], "File written successfully");

    client.send(r#"{"action":"LIST"}"#).await;
    let listing = client.recv_until(|v| v.get("files").is_some()).await;
    assert_eq!(listing["files"][0]["name"], "x.txt");

    client.close().await;
    let stats = gateway.stop().await;
    assert_eq!(stats.requests, 2);
}

#[tokio::test]
async fn test_every_client_sees_every_response() {
    let gateway = RunningGateway::start(store_backend()).await;
    let mut alice = TestClient::connect_ready(gateway.addr).await;
    let mut bob = TestClient::connect_ready(gateway.addr).await;

    alice.send(r#"{"action":"WRITE","file":"shared.md","data":"x","id":"alice:1"}"#).await;

    let seen_by_alice = alice.recv_until(|v| v["id"] == "alice:1").await;
    let seen_by_bob = bob.recv_until(|v| v["id"] == "alice:1").await;
    assert_eq!(seen_by_alice, seen_by_bob);
    assert_eq!(seen_by_bob["file"], "shared.md");

    gateway.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_relay_is_byte_transparent() {
    let backend = Backend::spawn(&BackendCommand::new("cat")).expect("cat should be available");
    let gateway = RunningGateway::start(backend).await;
    let mut client = TestClient::connect(gateway.addr).await;

    client.send("not json {at all").await;
    let echoed = client.recv_text_timeout(WAIT).await.unwrap();
    assert_eq!(echoed, "not json {at all");

    gateway.stop().await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_multiple_lines_in_one_frame_are_split() {
    let backend = Backend::spawn(&BackendCommand::new("cat")).expect("cat should be available");
    let gateway = RunningGateway::start(backend).await;
    let mut client = TestClient::connect(gateway.addr).await;

    client.send("{\"a\":1}\n\n{\"b\":2}").await;
    assert_eq!(client.recv_text_timeout(WAIT).await.unwrap(), r#"{"a":1}"#);
    assert_eq!(client.recv_text_timeout(WAIT).await.unwrap(), r#"{"b":2}"#);

    gateway.stop().await;
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_client_churn_does_not_affect_backend() {
    let gateway = RunningGateway::start(store_backend()).await;

    let mut first = TestClient::connect_ready(gateway.addr).await;
    first.send(r#"{"action":"WRITE","file":"keep.txt","data":"1","id":"first:1"}"#).await;
    first.recv_until(|v| v["id"] == "first:1").await;
    first.close().await;

    for _ in 0..3 {
        let client = TestClient::connect(gateway.addr).await;
        client.close().await;
    }

    let mut last = TestClient::connect(gateway.addr).await;
    last.send(r#"{"action":"LIST","id":"last:1"}"#).await;
    let listing = last.recv_until(|v| v["id"] == "last:1").await;
    assert_eq!(listing["files"][0]["name"], "keep.txt");

    gateway.stop().await;
}

#[tokio::test]
async fn test_backend_exit_keeps_gateway_serving() {
    let (to_store, store_in) = duplex(1024);
    let (store_out, from_store) = duplex(1024);
    let gateway = RunningGateway::start(Backend::from_io(to_store, from_store)).await;

    // Backend goes away
    drop(store_in);
    drop(store_out);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut client = TestClient::connect(gateway.addr).await;
    client.send(r#"{"action":"LIST"}"#).await;
    assert!(client.recv_text_timeout(Duration::from_millis(300)).await.is_err());

    let another = TestClient::connect(gateway.addr).await;
    another.close().await;

    let stats = gateway.stop().await;
    assert_eq!(stats.responses, 0);
}

#[tokio::test]
async fn test_stalled_handshake_does_not_block_relay() {
    let gateway = RunningGateway::start(store_backend()).await;
    let mut alice = TestClient::connect_ready(gateway.addr).await;

    // A peer that opens TCP and never sends the upgrade request
    let _stalled = TcpStream::connect(gateway.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    alice.send(r#"{"action":"LIST","id":"alice:1"}"#).await;
    let listing = alice.recv_until(|v| v["id"] == "alice:1").await;
    assert_eq!(listing["message"], "Directory listed");

    let mut bob = TestClient::connect_ready(gateway.addr).await;
    bob.send(r#"{"action":"LIST","id":"bob:1"}"#).await;
    bob.recv_until(|v| v["id"] == "bob:1").await;

    gateway.stop().await;
}

#[tokio::test]
async fn test_handshake_timeout_drops_peer() {
    let mut config = GatewayConfig::new(BackendCommand::new("in-process"));
    config.handshake_timeout = Duration::from_millis(100);
    let gateway = RunningGateway::start_with(config, store_backend()).await;

    let mut stalled = TcpStream::connect(gateway.addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = timeout(WAIT, stalled.read(&mut buf))
        .await
        .expect("Peer was not dropped");
    assert!(matches!(read, Ok(0) | Err(_)));

    gateway.stop().await;
}

// ============================================================================
// Backpressure Tests
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_backlogged_client_is_skipped_not_awaited() {
    let mut config = GatewayConfig::new(BackendCommand::new("cat"));
    config.client_queue = 4;
    let backend = Backend::spawn(&config.backend).expect("cat should be available");
    let gateway = RunningGateway::start_with(config, backend).await;

    let mut reader = TestClient::connect(gateway.addr).await;

    // A client with a tiny receive window that never reads
    let socket = TcpSocket::new_v4().unwrap();
    socket.set_recv_buffer_size(4096).unwrap();
    let stream = socket.connect(gateway.addr).await.unwrap();
    let (idle_ws, _) = client_async(format!("ws://{}", gateway.addr), stream)
        .await
        .expect("Failed to connect idle client");

    // Round trip once so both clients are registered
    reader.send("ready").await;
    assert_eq!(reader.recv_text_timeout(WAIT).await.unwrap(), "ready");

    let payload = "x".repeat(64 * 1024);
    let total = 200;
    for i in 0..total {
        let line = format!("{i}:{payload}");
        reader.send(&line).await;
        let echoed = reader.recv_text_timeout(WAIT).await.unwrap();
        assert_eq!(echoed.len(), line.len());
        assert!(echoed.starts_with(&format!("{i}:")));
    }

    let stats = gateway.stop().await;
    assert_eq!(stats.responses, total + 1);
    assert!(stats.skipped > 0, "idle client should have been skipped");
    drop(idle_ws);
}
