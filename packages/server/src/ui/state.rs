//! Server state shared by every handler.

use std::sync::Arc;

use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::usecase::BroadcastCoordinator;

/// Shared application state
pub struct AppState {
    /// BroadcastCoordinator（配信・履歴管理のユースケース）
    pub coordinator: Arc<BroadcastCoordinator>,
    /// Cancelled once shutdown begins; new upgrades are refused after that
    pub closing: CancellationToken,
    /// Cancelled when the grace period is over; running sessions stop
    pub terminate: CancellationToken,
    /// Every upgraded session
    pub sessions: TaskTracker,
}

impl AppState {
    pub fn new(coordinator: Arc<BroadcastCoordinator>) -> Self {
        Self {
            coordinator,
            closing: CancellationToken::new(),
            terminate: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }
}
