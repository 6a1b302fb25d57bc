//! End-to-end tests against a real server using WebSocket and HTTP clients.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use huddle_server::config::ServerConfig;
use huddle_server::metrics::detached_handle;
use huddle_server::server::HuddleServer;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    server: Arc<HuddleServer>,
    base_url: String,
    ws_url: String,
}

async fn boot_with(config: ServerConfig) -> TestServer {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..config
    };
    let server = Arc::new(HuddleServer::new(config, detached_handle()));
    let (addr, _handle) = server.listen().await.unwrap();
    TestServer {
        server,
        base_url: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/ws"),
    }
}

async fn boot_server() -> TestServer {
    boot_with(ServerConfig::default()).await
}

impl TestServer {
    /// Open `n` channels and wait until the engine has attached all of them.
    async fn connect(&self, n: usize) -> Vec<WsStream> {
        let before = self.server.engine().connection_count();
        let mut clients = Vec::with_capacity(n);
        for _ in 0..n {
            let (ws, _) = connect_async(&self.ws_url).await.unwrap();
            clients.push(ws);
        }
        self.wait_for(|s| s.engine().connection_count() == before + n).await;
        clients
    }

    async fn wait_for(&self, cond: impl Fn(&HuddleServer) -> bool) {
        timeout(TIMEOUT, async {
            while !cond(&self.server) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timeout waiting for server state");
    }
}

async fn send_event(ws: &mut WsStream, event: &str, data: Value) {
    let frame = json!({"event": event, "data": data});
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

/// Read the next text frame as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read the next event and check its name.
async fn expect_event(ws: &mut WsStream, name: &str) -> Value {
    let event = read_json(ws).await;
    assert_eq!(event["event"], name, "unexpected event: {event}");
    event
}

/// Assert nothing arrives within a short window.
async fn expect_silence(ws: &mut WsStream) {
    let quiet = timeout(Duration::from_millis(200), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                Some(Ok(_)) => {}
                _ => return None,
            }
        }
    })
    .await;
    if let Ok(Some(text)) = quiet {
        panic!("expected no events, got {text}");
    }
}

fn snapshot_names(event: &Value) -> Vec<String> {
    event["data"]["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["displayName"].as_str().unwrap().to_owned())
        .collect()
}

#[tokio::test]
async fn ann_and_bo_chat_then_bo_leaves() {
    let ts = boot_server().await;
    let mut clients = ts.connect(2).await;
    let mut b = clients.pop().unwrap();
    let mut a = clients.pop().unwrap();

    send_event(&mut a, "join", json!({"displayName": "Ann"})).await;
    let snap = expect_event(&mut a, "presence-snapshot").await;
    assert_eq!(snapshot_names(&snap), vec!["Ann"]);
    let notice = expect_event(&mut b, "system-join-notice").await;
    assert_eq!(notice["data"]["displayName"], "Ann");
    let _ = expect_event(&mut b, "presence-snapshot").await;

    send_event(&mut b, "join", json!({"displayName": "Bo"})).await;
    let notice = expect_event(&mut a, "system-join-notice").await;
    assert_eq!(notice["data"]["text"], "Bo joined the chat");
    let a_snap = expect_event(&mut a, "presence-snapshot").await;
    let b_snap = expect_event(&mut b, "presence-snapshot").await;
    assert_eq!(snapshot_names(&a_snap), vec!["Ann", "Bo"]);
    assert_eq!(snapshot_names(&b_snap), vec!["Ann", "Bo"]);

    send_event(&mut a, "send-message", json!({"content": "hello"})).await;
    for ws in [&mut a, &mut b] {
        let msg = expect_event(ws, "message").await;
        assert_eq!(msg["data"]["senderName"], "Ann");
        assert_eq!(msg["data"]["content"], "hello");
        assert_eq!(msg["data"]["kind"], "user");
    }

    b.close(None).await.unwrap();
    let leave = expect_event(&mut a, "system-leave-notice").await;
    assert_eq!(leave["data"]["displayName"], "Bo");
    let snap = expect_event(&mut a, "presence-snapshot").await;
    assert_eq!(snapshot_names(&snap), vec!["Ann"]);
    expect_silence(&mut a).await;
}

#[tokio::test]
async fn conflicting_and_blank_names_are_rejected() {
    let ts = boot_server().await;
    let mut clients = ts.connect(2).await;
    let mut b = clients.pop().unwrap();
    let mut a = clients.pop().unwrap();

    send_event(&mut a, "join", json!({"displayName": "Alice"})).await;
    let _ = expect_event(&mut a, "presence-snapshot").await;
    let _ = expect_event(&mut b, "system-join-notice").await;
    let _ = expect_event(&mut b, "presence-snapshot").await;

    send_event(&mut b, "join", json!({"displayName": " Alice "})).await;
    let rejected = expect_event(&mut b, "join-rejected").await;
    assert_eq!(rejected["data"]["reason"], "NameConflict");

    send_event(&mut b, "join", json!({"displayName": "   "})).await;
    let rejected = expect_event(&mut b, "join-rejected").await;
    assert_eq!(rejected["data"]["reason"], "InvalidName");

    expect_silence(&mut a).await;
    assert_eq!(ts.server.engine().online_users().len(), 1);

    // The rejected connection may retry with another name.
    send_event(&mut b, "join", json!({"displayName": "Bob"})).await;
    let snap = expect_event(&mut b, "presence-snapshot").await;
    assert_eq!(snapshot_names(&snap), vec!["Alice", "Bob"]);
}

#[tokio::test]
async fn bad_frames_do_not_close_the_connection() {
    let ts = boot_server().await;
    let mut a = ts.connect(1).await.pop().unwrap();

    a.send(Message::text("not json")).await.unwrap();
    send_event(&mut a, "shout", json!({})).await;
    send_event(&mut a, "send-message", json!({"content": "too early"})).await;
    send_event(&mut a, "join", json!({"displayName": 42})).await;
    a.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    expect_silence(&mut a).await;

    send_event(&mut a, "join", json!({"username": "Ann"})).await;
    let snap = expect_event(&mut a, "presence-snapshot").await;
    assert_eq!(snapshot_names(&snap), vec!["Ann"]);
}

#[tokio::test]
async fn typing_reaches_others_only() {
    let ts = boot_server().await;
    let mut clients = ts.connect(2).await;
    let mut b = clients.pop().unwrap();
    let mut a = clients.pop().unwrap();

    send_event(&mut a, "join", json!({"displayName": "Ann"})).await;
    let _ = expect_event(&mut a, "presence-snapshot").await;
    let _ = expect_event(&mut b, "system-join-notice").await;
    let _ = expect_event(&mut b, "presence-snapshot").await;

    send_event(&mut a, "typing-start", json!({})).await;
    send_event(&mut a, "typing-stop", json!({})).await;
    let start = expect_event(&mut b, "typing-start").await;
    assert_eq!(start["data"]["senderName"], "Ann");
    let _ = expect_event(&mut b, "typing-stop").await;
    expect_silence(&mut a).await;
}

#[tokio::test]
async fn unjoined_close_broadcasts_nothing() {
    let ts = boot_server().await;
    let mut clients = ts.connect(2).await;
    let mut lurker = clients.pop().unwrap();
    let mut a = clients.pop().unwrap();

    send_event(&mut a, "join", json!({"displayName": "Ann"})).await;
    let _ = expect_event(&mut a, "presence-snapshot").await;

    lurker.close(None).await.unwrap();
    ts.wait_for(|s| s.engine().connection_count() == 1).await;
    expect_silence(&mut a).await;
}

#[tokio::test]
async fn http_join_check_and_online_users() {
    let ts = boot_server().await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("{}/api/users/join", ts.base_url))
        .json(&json!({"displayName": "Ann"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    // The check does not reserve the name.
    assert!(ts.server.engine().online_users().is_empty());

    let mut a = ts.connect(1).await.pop().unwrap();
    send_event(&mut a, "join", json!({"displayName": "Ann"})).await;
    let _ = expect_event(&mut a, "presence-snapshot").await;

    let resp = http
        .post(format!("{}/api/users/join", ts.base_url))
        .json(&json!({"displayName": "Ann"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let resp = http
        .post(format!("{}/api/users/join", ts.base_url))
        .json(&json!({"displayName": ""}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let online: Value = http
        .get(format!("{}/api/users/online", ts.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(online["users"][0]["displayName"], "Ann");

    let health: Value = http
        .get(format!("{}/health", ts.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["connections"], 1);
    assert_eq!(health["online_users"], 1);
}

#[tokio::test]
async fn silent_client_is_dropped_by_heartbeat() {
    let ts = boot_with(ServerConfig {
        heartbeat_interval: Duration::from_millis(50),
        heartbeat_timeout: Duration::from_millis(100),
        ..ServerConfig::default()
    })
    .await;
    let mut clients = ts.connect(1).await;
    let mut a = clients.pop().unwrap();
    send_event(&mut a, "join", json!({"displayName": "Ann"})).await;
    ts.wait_for(|s| s.engine().online_users().len() == 1).await;

    // Never reading means never answering pings.
    ts.wait_for(|s| s.engine().connection_count() == 0).await;
    assert!(ts.server.engine().online_users().is_empty());
}

#[tokio::test]
async fn shutdown_closes_sessions() {
    let ts = boot_server().await;
    let mut a = ts.connect(1).await.pop().unwrap();
    send_event(&mut a, "join", json!({"displayName": "Ann"})).await;
    let _ = expect_event(&mut a, "presence-snapshot").await;

    ts.server.shutdown().shutdown();
    ts.wait_for(|s| s.engine().connection_count() == 0).await;

    // Well under the writer's drain timeout.
    let frame = timeout(Duration::from_millis(500), async {
        loop {
            match a.next().await {
                Some(Ok(Message::Text(_) | Message::Ping(_) | Message::Pong(_))) => {}
                other => return other,
            }
        }
    })
    .await
    .expect("no close frame before drain timeout");
    assert!(
        matches!(frame, Some(Ok(Message::Close(_)))),
        "expected close frame, got {frame:?}"
    );
}

#[tokio::test]
async fn client_close_releases_session_promptly() {
    let ts = boot_server().await;
    let mut clients = ts.connect(2).await;
    let mut b = clients.pop().unwrap();
    let mut a = clients.pop().unwrap();
    send_event(&mut a, "join", json!({"displayName": "Ann"})).await;
    let _ = expect_event(&mut a, "presence-snapshot").await;
    let _ = expect_event(&mut b, "system-join-notice").await;
    let _ = expect_event(&mut b, "presence-snapshot").await;

    b.close(None).await.unwrap();
    ts.wait_for(|s| s.engine().connection_count() == 1).await;

    // The session task ends without waiting out the writer drain.
    timeout(Duration::from_millis(500), async {
        while ts.server.shutdown().sessions().len() > 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("closed session lingered");
}

#[tokio::test]
async fn graceful_shutdown_waits_for_sessions() {
    let ts = boot_server().await;
    let mut clients = ts.connect(2).await;
    let mut b = clients.pop().unwrap();
    let mut a = clients.pop().unwrap();
    send_event(&mut a, "join", json!({"displayName": "Ann"})).await;
    let _ = expect_event(&mut a, "presence-snapshot").await;
    send_event(&mut b, "join", json!({"displayName": "Bo"})).await;
    let _ = expect_event(&mut b, "presence-snapshot").await;

    assert!(
        ts.server
            .shutdown()
            .graceful_shutdown(Vec::new(), Some(TIMEOUT))
            .await
    );
    assert!(ts.server.shutdown().sessions().is_empty());
    assert_eq!(ts.server.engine().connection_count(), 0);
    assert!(ts.server.engine().online_users().is_empty());
}
