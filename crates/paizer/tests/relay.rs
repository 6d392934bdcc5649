//! Integration tests for the relay: real listeners, real clients on both
//! transports, and the full join → chat → leave flow.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use paizer::prelude::*;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Upper bound on how long any single expected event may take.
const WAIT: Duration = Duration::from_secs(3);

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    stream_addr: String,
    websocket_addr: String,
    relay: Arc<Relay>,
}

/// Starts a relay with both listeners on OS-assigned ports.
async fn start_server(config: RelayConfig) -> TestServer {
    let server = RelayServer::builder()
        .bind_stream("127.0.0.1:0")
        .bind_websocket("127.0.0.1:0")
        .config(config)
        .build()
        .await
        .expect("server should build");

    let test_server = TestServer {
        stream_addr: server.local_stream_addr().expect("stream addr").to_string(),
        websocket_addr: server
            .local_websocket_addr()
            .expect("websocket addr")
            .to_string(),
        relay: server.relay(),
    };
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    test_server
}

/// A raw line-oriented client.
struct RawClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl RawClient {
    async fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).await.expect("should connect");
        let (read, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn join(addr: &str, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(name).await;
        assert_eq!(client.next_line().await.as_deref(), Some(WELCOME));
        client
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write line");
    }

    /// Next non-probe line, or `None` once the server closed the stream.
    async fn next_line(&mut self) -> Option<String> {
        loop {
            let line = timeout(WAIT, self.lines.next_line())
                .await
                .expect("timed out waiting for a line")
                .ok()??;
            if line != "HEARTBEAT" {
                return Some(line);
            }
        }
    }

    /// Asserts that nothing but probes arrives within `quiet`.
    async fn expect_silence(&mut self, quiet: Duration) {
        let deadline = tokio::time::Instant::now() + quiet;
        loop {
            match tokio::time::timeout_at(deadline, self.lines.next_line()).await {
                Err(_) => return,
                Ok(Ok(Some(line))) if line == "HEARTBEAT" => continue,
                Ok(other) => panic!("expected silence, got {other:?}"),
            }
        }
    }
}

async fn ws_connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn ws_send(ws: &mut ClientWs, frame: Value) {
    ws.send(WsMessage::text(frame.to_string()))
        .await
        .expect("send frame");
}

/// Next JSON frame, or `None` once the server closed the connection.
async fn ws_next(ws: &mut ClientWs) -> Option<Value> {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")?;
        match msg {
            Ok(WsMessage::Text(text)) => {
                return Some(serde_json::from_str(text.as_str()).expect("valid json"));
            }
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn ws_join(addr: &str, name: &str) -> ClientWs {
    let mut ws = ws_connect(addr).await;
    ws_send(&mut ws, json!({"type": "join", "user": name})).await;
    let welcome = ws_next(&mut ws).await.expect("welcome frame");
    assert_eq!(welcome, json!({"type": "system", "content": WELCOME}));
    ws
}

/// Polls until the registry holds `n` sessions.
async fn wait_for_len(relay: &Relay, n: usize) {
    timeout(WAIT, async {
        while relay.registry().len().await != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never reached the expected size");
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_mixed_transports_join_chat_and_leave() {
    let server = start_server(RelayConfig::default()).await;

    let mut alice = RawClient::join(&server.stream_addr, "alice").await;
    let mut bob = ws_join(&server.websocket_addr, "bob").await;

    let joined = alice.next_line().await.expect("join line");
    assert!(joined.ends_with("] bob@127.0.0.1 joined the chat"), "got {joined:?}");

    alice.send("hello").await;
    let chat = ws_next(&mut bob).await.expect("chat frame");
    assert_eq!(
        chat,
        json!({
            "type": "chat",
            "uid": "1",
            "user": "alice",
            "content": "hello",
            "ip": "127.0.0.1",
        })
    );

    ws_send(&mut bob, json!({"type": "chat", "content": "hi alice"})).await;
    let line = alice.next_line().await.expect("chat line");
    assert!(line.starts_with('['), "got {line:?}");
    assert!(line.ends_with("] [bob@127.0.0.1] hi alice"), "got {line:?}");

    bob.close(None).await.expect("close");
    let left = alice.next_line().await.expect("leave line");
    assert!(left.ends_with("] bob@127.0.0.1 left the chat"), "got {left:?}");
    alice.expect_silence(Duration::from_millis(300)).await;

    let ids: Vec<SessionId> = server
        .relay
        .registry()
        .snapshot()
        .await
        .iter()
        .map(|s| s.id())
        .collect();
    assert_eq!(ids, vec![SessionId(1)]);
}

#[tokio::test]
async fn test_sender_does_not_receive_own_chat() {
    let server = start_server(RelayConfig::default()).await;
    let mut alice = RawClient::join(&server.stream_addr, "alice").await;
    let mut carol = RawClient::join(&server.stream_addr, "carol").await;
    alice.next_line().await.expect("carol's join");

    carol.send("only for alice").await;

    let line = alice.next_line().await.expect("chat line");
    assert!(line.ends_with("] [carol@127.0.0.1] only for alice"), "got {line:?}");
    carol.expect_silence(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_empty_lines_are_not_relayed() {
    let server = start_server(RelayConfig::default()).await;
    let mut alice = RawClient::join(&server.stream_addr, "alice").await;
    let mut bob = ws_join(&server.websocket_addr, "bob").await;

    alice.send("").await;
    alice.send("   ").await;
    alice.send("real").await;

    let chat = ws_next(&mut bob).await.expect("chat frame");
    assert_eq!(chat["content"], "real");
}

#[tokio::test]
async fn test_websocket_first_frame_not_join_creates_no_session() {
    let server = start_server(RelayConfig::default()).await;
    let mut ws = ws_connect(&server.websocket_addr).await;

    ws_send(&mut ws, json!({"type": "chat", "content": "sneaky"})).await;

    assert_eq!(ws_next(&mut ws).await, None, "server should close");
    assert_eq!(server.relay.registry().len().await, 0);
}

#[tokio::test]
async fn test_raw_client_closing_before_join_creates_no_session() {
    let server = start_server(RelayConfig::default()).await;
    let client = TcpStream::connect(&server.stream_addr).await.unwrap();
    drop(client);

    // A later joiner still gets the first id: none was spent on the failure.
    let _alice = RawClient::join(&server.stream_addr, "alice").await;
    let sessions = server.relay.registry().snapshot().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id(), SessionId(1));
}

#[tokio::test]
async fn test_raw_client_is_probed_with_heartbeat() {
    let server = start_server(RelayConfig {
        probe_interval: Duration::from_millis(100),
        ..RelayConfig::default()
    })
    .await;
    let mut alice = RawClient::join(&server.stream_addr, "alice").await;

    let line = timeout(WAIT, alice.lines.next_line())
        .await
        .expect("timed out")
        .expect("read")
        .expect("line");
    assert_eq!(line, "HEARTBEAT");
}

#[tokio::test]
async fn test_silent_raw_client_is_dropped_after_idle_timeout() {
    let server = start_server(RelayConfig {
        idle_timeout: Duration::from_millis(200),
        ..RelayConfig::default()
    })
    .await;
    let mut watcher = ws_join(&server.websocket_addr, "watcher").await;
    let mut silent = RawClient::join(&server.stream_addr, "silent").await;
    let join = ws_next(&mut watcher).await.expect("join frame");
    assert_eq!(join["type"], "join");

    let leave = ws_next(&mut watcher).await.expect("leave frame");
    assert_eq!(leave["type"], "leave");
    assert_eq!(leave["user"], "silent");
    assert_eq!(silent.next_line().await, None, "socket should be closed");
    assert_eq!(server.relay.registry().len().await, 1);
}

#[tokio::test]
async fn test_heartbeats_keep_raw_client_past_idle_timeout() {
    let server = start_server(RelayConfig {
        idle_timeout: Duration::from_millis(300),
        ..RelayConfig::default()
    })
    .await;
    let mut alice = RawClient::join(&server.stream_addr, "alice").await;

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        alice.send("HEARTBEAT").await;
    }

    assert_eq!(server.relay.registry().len().await, 1);
}

#[tokio::test]
async fn test_silent_websocket_client_is_evicted_by_monitor() {
    let server = start_server(RelayConfig {
        sweep_interval: Duration::from_millis(100),
        stale_after: Duration::from_millis(300),
        ..RelayConfig::default()
    })
    .await;
    let mut watcher = RawClient::join(&server.stream_addr, "watcher").await;
    let mut ghost = ws_join(&server.websocket_addr, "ghost").await;
    watcher.next_line().await.expect("ghost's join");

    // Keep the watcher fresh while the ghost stays silent.
    let left = loop {
        watcher.send("HEARTBEAT").await;
        match timeout(Duration::from_millis(100), watcher.lines.next_line()).await {
            Ok(Ok(Some(line))) if line != "HEARTBEAT" => break line,
            Ok(Ok(Some(_))) | Err(_) => continue,
            Ok(other) => panic!("watcher lost its connection: {other:?}"),
        }
    };
    assert!(left.ends_with("] ghost@127.0.0.1 left the chat"), "got {left:?}");

    assert_eq!(ws_next(&mut ghost).await, None, "ghost should be disconnected");
    wait_for_len(&server.relay, 1).await;
}

#[tokio::test]
async fn test_websocket_heartbeats_prevent_eviction() {
    let server = start_server(RelayConfig {
        sweep_interval: Duration::from_millis(100),
        stale_after: Duration::from_millis(300),
        ..RelayConfig::default()
    })
    .await;
    let mut bob = ws_join(&server.websocket_addr, "bob").await;

    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        ws_send(&mut bob, json!({"type": "heartbeat"})).await;
    }

    assert_eq!(server.relay.registry().len().await, 1);
}

#[tokio::test]
async fn test_server_stops_accepting_after_shutdown() {
    let server = RelayServer::builder()
        .bind_stream("127.0.0.1:0")
        .build()
        .await
        .unwrap();
    let addr = server.local_stream_addr().unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = rx.await;
    }));
    tx.send(()).unwrap();
    running.await.unwrap().unwrap();

    // The listener was dropped with the aborted accept loop.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_malformed_websocket_frames_are_dropped_and_connection_survives() {
    let server = start_server(RelayConfig::default()).await;
    let mut alice = RawClient::join(&server.stream_addr, "alice").await;
    let mut bob = ws_join(&server.websocket_addr, "bob").await;
    alice.next_line().await.expect("bob's join");

    bob.send(WsMessage::text("not json")).await.expect("send");
    ws_send(&mut bob, json!({"type": "leave"})).await;
    ws_send(&mut bob, json!({"type": "chat", "content": "still here"})).await;

    let line = alice.next_line().await.expect("chat line");
    assert!(line.ends_with("] [bob@127.0.0.1] still here"), "got {line:?}");
    assert_eq!(server.relay.registry().len().await, 2);
}

#[tokio::test]
async fn test_raw_blank_name_creates_no_session() {
    let server = start_server(RelayConfig::default()).await;
    let mut client = RawClient::connect(&server.stream_addr).await;

    client.send("   ").await;

    assert_eq!(client.next_line().await, None, "server should close");
    assert_eq!(server.relay.registry().len().await, 0);
}

#[tokio::test]
async fn test_missing_join_is_dropped_after_handshake_timeout() {
    let server = start_server(RelayConfig {
        handshake_timeout: Duration::from_millis(200),
        ..RelayConfig::default()
    })
    .await;
    let mut raw = RawClient::connect(&server.stream_addr).await;
    let mut ws = ws_connect(&server.websocket_addr).await;

    assert_eq!(raw.next_line().await, None, "raw socket should be closed");
    assert_eq!(ws_next(&mut ws).await, None, "websocket should be closed");
    assert_eq!(server.relay.registry().len().await, 0);
}

#[tokio::test]
async fn test_client_that_stops_reading_is_still_evicted_under_chat_load() {
    let server = start_server(RelayConfig {
        idle_timeout: Duration::from_secs(1),
        sweep_interval: Duration::from_secs(60),
        stale_after: Duration::from_secs(120),
        ..RelayConfig::default()
    })
    .await;
    let mut watcher = ws_join(&server.websocket_addr, "watcher").await;
    // Joins, then neither reads nor writes: its socket buffers fill up.
    let _stuck = RawClient::join(&server.stream_addr, "stuck").await;
    let mut flood = RawClient::join(&server.stream_addr, "flood").await;

    // Flood from another task so the watcher keeps draining meanwhile.
    let flooding = tokio::spawn(async move {
        let line = "x".repeat(60 * 1024);
        for _ in 0..500 {
            flood.send(&line).await;
        }
        flood
    });

    let evicted = timeout(Duration::from_secs(10), async {
        loop {
            match ws_next(&mut watcher).await {
                Some(frame) if frame["type"] == "leave" && frame["user"] == "stuck" => break,
                Some(_) => continue,
                None => panic!("watcher lost its connection"),
            }
        }
    })
    .await;
    assert!(evicted.is_ok(), "stuck client was never evicted");

    let names: Vec<String> = server
        .relay
        .registry()
        .snapshot()
        .await
        .iter()
        .map(|s| s.name().to_owned())
        .collect();
    assert!(!names.iter().any(|n| n == "stuck"), "registry still has {names:?}");
    drop(flooding.await);
}
