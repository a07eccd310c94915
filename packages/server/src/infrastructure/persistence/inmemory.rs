//! InMemory Persistence Gateway 実装
//!
//! ドメイン層が定義する `PersistenceGateway` trait の具体的な実装。
//! プロセスが終了すると内容は失われます。テストと永続化不要な起動で使用します。

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ChatEvent, DrawEvent, Identity, PersistenceError, PersistenceGateway};

use super::state::PersistedState;

#[derive(Debug, Default)]
struct Store {
    state: PersistedState,
    closed: bool,
}

/// インメモリ Persistence Gateway 実装
#[derive(Debug, Default)]
pub struct InMemoryPersistenceGateway {
    store: Mutex<Store>,
}

impl InMemoryPersistenceGateway {
    /// 空の InMemoryPersistenceGateway を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 既存の状態から作成（テストや復元の確認用）
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            store: Mutex::new(Store {
                state,
                closed: false,
            }),
        }
    }

    /// 現在の状態のコピーを取得
    pub async fn state(&self) -> PersistedState {
        self.store.lock().await.state.clone()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryPersistenceGateway {
    async fn record_user(&self, identity: &Identity) -> Result<(), PersistenceError> {
        let mut store = self.store.lock().await;
        if store.closed {
            return Err(PersistenceError::Closed);
        }
        if store.state.add_user(identity) {
            tracing::debug!("User '{}' recorded", identity);
        }
        Ok(())
    }

    async fn record_chat(&self, event: &ChatEvent) -> Result<(), PersistenceError> {
        let mut store = self.store.lock().await;
        if store.closed {
            return Err(PersistenceError::Closed);
        }
        store.state.push_chat(event);
        Ok(())
    }

    async fn record_drawing_snapshot(
        &self,
        identity: &Identity,
        events: &[DrawEvent],
    ) -> Result<(), PersistenceError> {
        let mut store = self.store.lock().await;
        if store.closed {
            return Err(PersistenceError::Closed);
        }
        store.state.push_drawing(identity, events);
        Ok(())
    }

    async fn recent_chat(&self, limit: usize) -> Result<Vec<ChatEvent>, PersistenceError> {
        let store = self.store.lock().await;
        if store.closed {
            return Err(PersistenceError::Closed);
        }
        Ok(store.state.recent_chat(limit))
    }

    async fn latest_drawing_snapshot(&self) -> Result<Vec<DrawEvent>, PersistenceError> {
        let store = self.store.lock().await;
        if store.closed {
            return Err(PersistenceError::Closed);
        }
        Ok(store.state.latest_drawing())
    }

    async fn close(&self) -> Result<(), PersistenceError> {
        let mut store = self.store.lock().await;
        store.closed = true;
        tracing::debug!("In-memory persistence gateway closed");
        Ok(())
    }
}
