//! Session registry: the single source of truth for who is online.

use std::collections::HashMap;

use tokio::sync::Mutex;

use super::{
    session::SessionHandle,
    value_object::{Identity, SessionId},
};

/// Concurrent identity → session mapping.
///
/// No method touches session I/O, so every call completes promptly no matter
/// how slow a peer is.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Identity, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-or-replace. Returns the handle that was displaced, if any
    /// (last writer wins; the displaced session is left running).
    pub async fn register(&self, session: SessionHandle) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        let previous = sessions.insert(session.identity().clone(), session);
        tracing::debug!("Registry now holds {} session(s)", sessions.len());
        previous
    }

    /// Remove the entry for `identity` if it still belongs to `session_id`.
    ///
    /// A session displaced by a newer login with the same identity does not
    /// evict its successor. Absent entries are a no-op.
    pub async fn unregister(
        &self,
        identity: &Identity,
        session_id: SessionId,
    ) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(identity) {
            Some(current) if current.id() == session_id => sessions.remove(identity),
            _ => None,
        }
    }

    /// Point-in-time copy of every registered session, for fan-out.
    pub async fn snapshot_all(&self) -> Vec<SessionHandle> {
        let sessions = self.sessions.lock().await;
        sessions.values().cloned().collect()
    }

    #[cfg(test)]
    pub async fn get(&self, identity: &Identity) -> Option<SessionHandle> {
        let sessions = self.sessions.lock().await;
        sessions.get(identity).cloned()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
