//! Connection listener and shutdown sequence.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{config::ServerConfig, domain::Identity, usecase::BroadcastCoordinator};

use super::{
    error::ServerError,
    handler::{get_drawing, get_participants, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Drawing board server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(coordinator, ServerConfig::default());
/// server.run().await?;
/// ```
pub struct Server {
    /// BroadcastCoordinator（配信・履歴管理のユースケース）
    coordinator: Arc<BroadcastCoordinator>,
    config: ServerConfig,
}

impl Server {
    pub fn new(coordinator: Arc<BroadcastCoordinator>, config: ServerConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    /// Bind the listening socket without accepting yet.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let bind_addr = self.config.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ServerError::bind(bind_addr.clone(), e))?;
        let local_addr = listener.local_addr()?;

        Ok(BoundServer {
            listener,
            local_addr,
            state: Arc::new(AppState::new(self.coordinator)),
            shutdown_grace: self.config.shutdown_grace,
        })
    }

    /// Bind and serve until Ctrl+C or SIGTERM.
    pub async fn run(self) -> Result<(), ServerError> {
        self.bind().await?.serve_with_shutdown(shutdown_signal()).await
    }
}

/// A server whose socket is bound.
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<AppState>,
    shutdown_grace: Duration,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `signal` resolves, then shut down.
    ///
    /// Shutdown order: refuse new upgrades and announce the shutdown, stop
    /// accepting, wait up to the grace period for sessions, terminate the
    /// rest, save the final drawing, close the gateway.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = self.state;
        let app = router(state.clone());

        tracing::info!("Drawing board server listening on {}", self.local_addr);
        tracing::info!("Connect to: ws://{}/ws", self.local_addr);

        let graceful = {
            let state = state.clone();
            async move {
                signal.await;
                tracing::info!("Shutdown started; refusing new sessions");
                state.closing.cancel();
                state.coordinator.announce_shutdown().await;
            }
        };

        axum::serve(self.listener, app)
            .with_graceful_shutdown(graceful)
            .await?;
        tracing::info!("Listener closed");

        drain_sessions(&state, self.shutdown_grace).await;

        let coordinator = &state.coordinator;
        if let Err(e) = coordinator.save_drawing(&Identity::system()).await {
            tracing::warn!("Failed to save the final drawing snapshot: {}", e);
        }
        coordinator.close_gateway().await;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Build the router (WebSocket + HTTP endpoints).
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket エンドポイント
        .route("/ws", get(websocket_handler))
        // HTTP エンドポイント
        .route("/api/health", get(health_check))
        .route("/api/participants", get(get_participants))
        .route("/api/drawing", get(get_drawing))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn drain_sessions(state: &AppState, grace: Duration) {
    state.sessions.close();
    if state.sessions.is_empty() {
        return;
    }

    tracing::info!(
        "Waiting up to {:?} for {} session(s) to finish",
        grace,
        state.sessions.len()
    );
    if tokio::time::timeout(grace, state.sessions.wait()).await.is_err() {
        tracing::warn!(
            "{} session(s) still open after {:?}; terminating",
            state.sessions.len(),
            grace
        );
        state.terminate.cancel();
        state.sessions.wait().await;
    }
}
