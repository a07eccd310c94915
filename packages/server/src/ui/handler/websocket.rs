//! WebSocket session: login handshake, outbound writer and inbound loop.

use std::{ops::ControlFlow, sync::Arc, time::Duration};

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use tokio_util::task::task_tracker::TaskTrackerToken;

use crate::{
    domain::{ChatEvent, DrawEvent, Identity, OutboundReceiver, SessionHandle},
    infrastructure::dto::{
        ClientCommand, DecodedMessage, ProtocolError, decode_client_message, encode_server_event,
    },
    ui::{error::SessionError, state::AppState},
    usecase::BroadcastCoordinator,
};

/// How long a finished session may keep writing already-queued events.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    if state.is_closing() {
        tracing::info!("Refusing WebSocket upgrade: server is shutting down");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    // Counted by the tracker from here until the session task ends
    let token = state.sessions.token();
    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

/// Spawns a task that drains this session's queue into the WebSocket sink.
///
/// Ends when every sender is gone or the peer stops accepting writes, then
/// closes the sink.
fn pusher_loop(
    mut rx: OutboundReceiver,
    mut sender: SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match encode_server_event(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to encode outbound event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, _token: TaskTrackerToken) {
    let (mut sender, mut receiver) = socket.split();

    // LoggingIn
    let login = tokio::select! {
        result = wait_for_join(&mut receiver) => result,
        _ = state.terminate.cancelled() => return,
    };
    let identity = match login {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!("Login failed: {}", e);
            let _ = sender.close().await;
            return;
        }
    };

    let coordinator = state.coordinator.clone();
    let (session, rx) = SessionHandle::channel(identity.clone(), coordinator.now());
    tracing::info!("'{}' logged in (session {})", identity, session.id());

    let mut send_task = pusher_loop(rx, sender);

    match coordinator.join(session.clone()).await {
        Ok(outcome) => {
            if let Some(previous) = outcome.replaced {
                tracing::info!("'{}' took over from session {}", identity, previous);
            }
        }
        Err(e) => tracing::warn!("Replay to '{}' failed: {}", identity, e),
    }

    // Active
    let mut recv_task = tokio::spawn(receive_loop(receiver, coordinator.clone(), session.clone()));

    let writer_done = tokio::select! {
        result = &mut recv_task => {
            match result {
                Ok(Ok(())) => tracing::info!("'{}' left", identity),
                Ok(Err(e)) => tracing::warn!("Session of '{}' ended: {}", identity, e),
                Err(e) => tracing::error!("Receive task of '{}' failed: {}", identity, e),
            }
            false
        }
        _ = &mut send_task => {
            tracing::info!("Connection to '{}' stopped accepting writes", identity);
            recv_task.abort();
            true
        }
        _ = state.terminate.cancelled() => {
            tracing::info!("Terminating session of '{}'", identity);
            recv_task.abort();
            false
        }
    };

    // Terminated
    coordinator.leave(&session).await;
    drop(session);

    if !writer_done
        && tokio::time::timeout(FLUSH_TIMEOUT, &mut send_task)
            .await
            .is_err()
    {
        send_task.abort();
    }
    tracing::debug!("Session of '{}' cleaned up", identity);
}

/// Wait for the first message, which must be a join.
///
/// Ping/Pong frames before it are ignored.
async fn wait_for_join(receiver: &mut SplitStream<WebSocket>) -> Result<Identity, SessionError> {
    while let Some(frame) = receiver.next().await {
        match frame? {
            Message::Text(text) => {
                let decoded = decode_client_message(text.as_str())?;
                return match decoded.command {
                    ClientCommand::Join(identity) => Ok(identity),
                    _ => Err(ProtocolError::ExpectedJoin(decoded.kind).into()),
                };
            }
            Message::Binary(_) => return Err(ProtocolError::BinaryFrame.into()),
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => break,
        }
    }
    Err(SessionError::ClosedBeforeLogin)
}

/// Decode and dispatch inbound frames one at a time.
///
/// Returns `Ok` on a leave message, a Close frame or end of stream.
async fn receive_loop(
    mut receiver: SplitStream<WebSocket>,
    coordinator: Arc<BroadcastCoordinator>,
    session: SessionHandle,
) -> Result<(), SessionError> {
    while let Some(frame) = receiver.next().await {
        match frame? {
            Message::Text(text) => {
                let decoded = decode_client_message(text.as_str())?;
                if dispatch(&coordinator, &session, decoded).await?.is_break() {
                    return Ok(());
                }
            }
            Message::Binary(_) => return Err(ProtocolError::BinaryFrame.into()),
            Message::Ping(_) | Message::Pong(_) => {
                tracing::debug!("Received ping/pong from '{}'", session.identity());
            }
            Message::Close(_) => {
                tracing::info!("'{}' requested close", session.identity());
                return Ok(());
            }
        }
    }
    Ok(())
}

async fn dispatch(
    coordinator: &BroadcastCoordinator,
    session: &SessionHandle,
    message: DecodedMessage,
) -> Result<ControlFlow<()>, ProtocolError> {
    let identity = session.identity();
    if message.claimed_identity != identity.as_str() {
        tracing::warn!(
            "'{}' sent a {:?} message claiming identity '{}'; using the session identity",
            identity,
            message.kind,
            message.claimed_identity
        );
    }

    match message.command {
        ClientCommand::Chat(content) => {
            let event = ChatEvent::new(identity.clone(), content, coordinator.now());
            coordinator.broadcast_chat(event).await;
        }
        ClientCommand::Draw(action) => {
            coordinator
                .broadcast_draw(DrawEvent::new(identity.clone(), action))
                .await;
        }
        ClientCommand::SaveDrawing => {
            if let Err(e) = coordinator.save_drawing(identity).await {
                tracing::warn!("Failed to save drawing for '{}': {}", identity, e);
            }
        }
        ClientCommand::Leave => return Ok(ControlFlow::Break(())),
        ClientCommand::Join(_) => return Err(ProtocolError::AlreadyJoined),
    }

    Ok(ControlFlow::Continue(()))
}
