//! Integration tests: the server runs in-process on an ephemeral port and is
//! driven by real WebSocket and HTTP clients.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use rakugaki_server::{
    config::ServerConfig,
    domain::SessionRegistry,
    infrastructure::{
        dto::websocket::{MessageKind, WireMessage},
        persistence::InMemoryPersistenceGateway,
    },
    ui::{Server, ServerError},
    usecase::BroadcastCoordinator,
};
use rakugaki_shared::time::SystemClock;
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// Helper struct to manage the in-process server lifecycle
struct TestServer {
    addr: SocketAddr,
    gateway: Arc<InMemoryPersistenceGateway>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(ServerConfig::default()).await
    }

    async fn start_with(config: ServerConfig) -> Self {
        let config = ServerConfig {
            port: 0,
            shutdown_grace: Duration::from_millis(300),
            ..config
        };
        let gateway = Arc::new(InMemoryPersistenceGateway::new());
        let coordinator = Arc::new(BroadcastCoordinator::new(
            Arc::new(SessionRegistry::new()),
            gateway.clone(),
            Arc::new(SystemClock),
            config.coordinator_config(),
        ));
        let bound = Server::new(coordinator, config)
            .bind()
            .await
            .expect("Failed to bind test server");
        let addr = bound.local_addr();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(bound.serve_with_shutdown(async move {
            let _ = rx.await;
        }));

        TestServer {
            addr,
            gateway,
            shutdown: Some(tx),
            handle,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), &mut self.handle)
            .await
            .expect("Server did not shut down in time")
            .expect("Server task panicked")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn connect(server: &TestServer) -> Client {
    let (client, _) = connect_async(server.ws_url())
        .await
        .expect("Failed to connect");
    client
}

async fn send(client: &mut Client, message: &WireMessage) {
    let json = serde_json::to_string(message).unwrap();
    client.send(Message::text(json)).await.unwrap();
}

/// Next text frame, decoded. `None` when the server closed the connection.
async fn recv(client: &mut Client) -> Option<WireMessage> {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("Timed out waiting for a message");
        match frame {
            Some(Ok(Message::Text(text))) => {
                return Some(serde_json::from_str(text.as_str()).unwrap());
            }
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

/// Skip messages until one satisfies `predicate`, returning the skipped ones too.
async fn recv_until(
    client: &mut Client,
    predicate: impl Fn(&WireMessage) -> bool,
) -> Vec<WireMessage> {
    let mut received = Vec::new();
    while let Some(message) = recv(client).await {
        let done = predicate(&message);
        received.push(message);
        if done {
            return received;
        }
    }
    panic!("Connection closed before the expected message; got {received:?}");
}

/// Drain until the server closes the connection.
async fn expect_closed(client: &mut Client) {
    while recv(client).await.is_some() {}
}

fn is_notice(message: &WireMessage, content: &str) -> bool {
    message.identity == "system" && message.payload.as_deref() == Some(content)
}

/// Connect, log in, and wait until our own join notice (which follows the replay).
async fn join(server: &TestServer, name: &str) -> (Client, Vec<WireMessage>) {
    let mut client = connect(server).await;
    send(&mut client, &WireMessage::join(name)).await;
    let notice = format!("{name} has joined the room");
    let mut received = recv_until(&mut client, |m| is_notice(m, &notice)).await;
    received.pop();
    (client, received)
}

fn red_stroke(identity: &str) -> Vec<WireMessage> {
    vec![
        WireMessage::new(MessageKind::SetColor, identity).with_color(255, 0, 0),
        WireMessage::new(MessageKind::StrokeStart, identity).with_point(10, 10),
        WireMessage::new(MessageKind::StrokePoint, identity).with_point(20, 20),
        WireMessage::new(MessageKind::StrokeEnd, identity),
    ]
}

fn draws(messages: &[WireMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .filter(|m| m.kind != MessageKind::Chat)
        .cloned()
        .collect()
}

#[tokio::test]
async fn test_strokes_reach_peer_in_order_and_replay_to_late_joiner() {
    // テスト項目: A の描画が B に順序どおり届き、後から参加した C にはライブより先にリプレイされる
    // given (前提条件):
    let server = TestServer::start().await;
    let (mut alice, _) = join(&server, "alice").await;
    let (mut bob, _) = join(&server, "bob").await;
    recv_until(&mut alice, |m| is_notice(m, "bob has joined the room")).await;

    // when (操作):
    for message in red_stroke("alice") {
        send(&mut alice, &message).await;
    }

    // then (期待する結果):
    let received = recv_until(&mut bob, |m| m.kind == MessageKind::StrokeEnd).await;
    assert_eq!(draws(&received), red_stroke("alice"));

    let (mut carol, replayed) = join(&server, "carol").await;
    assert_eq!(draws(&replayed), red_stroke("alice"));

    // ライブイベントはリプレイの後に届く
    send(&mut bob, &WireMessage::new(MessageKind::Clear, "bob")).await;
    let live = recv_until(&mut carol, |m| m.kind == MessageKind::Clear).await;
    assert_eq!(draws(&live), vec![WireMessage::new(MessageKind::Clear, "bob")]);
}

#[tokio::test]
async fn test_chat_is_broadcast_to_others_and_replayed_later() {
    // テスト項目: チャットは送信者以外に届き、後から参加した人にはチャット履歴としてリプレイされる
    // given (前提条件):
    let server = TestServer::start().await;
    let (mut alice, _) = join(&server, "alice").await;
    let (mut bob, _) = join(&server, "bob").await;
    recv_until(&mut alice, |m| is_notice(m, "bob has joined the room")).await;

    // when (操作):
    send(&mut alice, &WireMessage::chat("alice", "hello")).await;

    // then (期待する結果):
    let received = recv_until(&mut bob, |m| m.identity == "alice").await;
    let chat = received.last().unwrap();
    assert_eq!(chat.kind, MessageKind::Chat);
    assert_eq!(chat.payload.as_deref(), Some("hello"));
    assert!(chat.timestamp.is_some());

    let (_carol, replayed) = join(&server, "carol").await;
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].payload.as_deref(), Some("hello"));

    // 送信者にはエコーされない（次に届くのは carol の入室通知）
    let next = recv(&mut alice).await.unwrap();
    assert!(is_notice(&next, "carol has joined the room"));
}

#[tokio::test]
async fn test_server_stamps_session_identity() {
    // テスト項目: 他人の identity を名乗ったメッセージもセッションの identity で配信される
    // given (前提条件):
    let server = TestServer::start().await;
    let (mut alice, _) = join(&server, "alice").await;
    let (mut bob, _) = join(&server, "bob").await;
    recv_until(&mut alice, |m| is_notice(m, "bob has joined the room")).await;

    // when (操作):
    send(&mut alice, &WireMessage::chat("mallory", "spoofed")).await;

    // then (期待する結果):
    let received = recv_until(&mut bob, |m| {
        m.kind == MessageKind::Chat && m.identity != "system"
    })
    .await;
    assert_eq!(received.last().unwrap().identity, "alice");
}

#[tokio::test]
async fn test_disconnect_does_not_affect_others() {
    // テスト項目: 1 人が切断しても残りの参加者間の配信は続き、退室通知が届く
    // given (前提条件):
    let server = TestServer::start().await;
    let (mut alice, _) = join(&server, "alice").await;
    let (bob, _) = join(&server, "bob").await;
    let (mut carol, _) = join(&server, "carol").await;

    // when (操作):
    drop(bob);
    recv_until(&mut carol, |m| is_notice(m, "bob has left the room")).await;
    send(&mut alice, &WireMessage::chat("alice", "still here")).await;

    // then (期待する結果):
    let received = recv_until(&mut carol, |m| m.identity == "alice").await;
    assert_eq!(received.last().unwrap().payload.as_deref(), Some("still here"));
    recv_until(&mut alice, |m| is_notice(m, "bob has left the room")).await;
}

#[tokio::test]
async fn test_first_message_must_be_join() {
    // テスト項目: 最初のメッセージが join でない接続は登録されずに閉じられる
    // given (前提条件):
    let server = TestServer::start().await;
    let mut client = connect(&server).await;

    // when (操作):
    send(&mut client, &WireMessage::chat("alice", "hi")).await;

    // then (期待する結果):
    assert!(recv(&mut client).await.is_none());
    let participants: serde_json::Value = reqwest::get(server.http_url("/api/participants"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(participants, serde_json::json!([]));
}

#[tokio::test]
async fn test_reserved_and_empty_identities_are_rejected() {
    // テスト項目: system や空の identity ではログインできない
    // given (前提条件):
    let server = TestServer::start().await;

    for name in ["system", ""] {
        // when (操作):
        let mut client = connect(&server).await;
        send(&mut client, &WireMessage::join(name)).await;

        // then (期待する結果):
        assert!(recv(&mut client).await.is_none(), "login as {name:?} accepted");
    }
}

#[tokio::test]
async fn test_invalid_message_terminates_only_that_session() {
    // テスト項目: 不正なメッセージを送ったセッションだけが終了する
    // given (前提条件):
    let server = TestServer::start().await;
    let (mut alice, _) = join(&server, "alice").await;
    let (mut bob, _) = join(&server, "bob").await;

    // when (操作): point のない stroke_start
    send(&mut bob, &WireMessage::new(MessageKind::StrokeStart, "bob")).await;

    // then (期待する結果):
    expect_closed(&mut bob).await;
    recv_until(&mut alice, |m| is_notice(m, "bob has left the room")).await;
}

#[tokio::test]
async fn test_http_endpoints() {
    // テスト項目: health / participants / drawing エンドポイント
    // given (前提条件):
    let server = TestServer::start().await;
    let (mut bob, _) = join(&server, "bob").await;
    let (mut alice, _) = join(&server, "alice").await;
    recv_until(&mut bob, |m| is_notice(m, "alice has joined the room")).await;
    for message in red_stroke("alice") {
        send(&mut alice, &message).await;
    }
    recv_until(&mut bob, |m| m.kind == MessageKind::StrokeEnd).await;

    // when (操作):
    let health: serde_json::Value = reqwest::get(server.http_url("/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let participants: Vec<serde_json::Value> = reqwest::get(server.http_url("/api/participants"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let drawing: serde_json::Value = reqwest::get(server.http_url("/api/drawing"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(health, serde_json::json!({"status": "ok"}));
    let names: Vec<&str> = participants
        .iter()
        .map(|p| p["identity"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alice", "bob"]);
    assert!(participants[0]["connected_at"].as_str().is_some());
    let events: Vec<WireMessage> = serde_json::from_value(drawing["events"].clone()).unwrap();
    assert_eq!(events, red_stroke("alice"));
}

#[tokio::test]
async fn test_graceful_shutdown_notifies_and_saves_drawing() {
    // テスト項目: シャットダウン時に通知が届き、描画が system 名義で保存され、サーバーが正常終了する
    // given (前提条件):
    let server = TestServer::start().await;
    let (mut alice, _) = join(&server, "alice").await;
    for message in red_stroke("alice") {
        send(&mut alice, &message).await;
    }
    send(&mut alice, &WireMessage::new(MessageKind::SaveDrawing, "alice")).await;
    let gateway = server.gateway.clone();
    let addr = server.addr;

    // save_drawing の反映を待つ
    let mut saved = false;
    for _ in 0..50 {
        if !gateway.state().await.drawings.is_empty() {
            saved = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(saved);

    // when (操作):
    let result = server.shutdown().await;

    // then (期待する結果):
    assert!(result.is_ok());
    recv_until(&mut alice, |m| is_notice(m, "Server is shutting down")).await;
    expect_closed(&mut alice).await;

    let state = gateway.state().await;
    assert_eq!(state.drawings.len(), 2);
    assert_eq!(state.drawings[0].saved_by.as_str(), "alice");
    assert_eq!(state.drawings[1].saved_by.as_str(), "system");
    assert_eq!(state.drawings[1].events.len(), 4);

    assert!(connect_async(format!("ws://{addr}/ws")).await.is_err());
}
