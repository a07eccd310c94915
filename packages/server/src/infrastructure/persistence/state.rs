//! 永続化される状態のレイアウト
//!
//! - users: identity をキーとするユーザー表
//! - chat_history: 受信順に並んだ追記専用のチャット表
//! - drawings: 保存者ごとの描画スナップショット（保存順）

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{ChatEvent, DrawEvent, Identity};

/// 描画スナップショット 1 件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawingRecord {
    pub saved_by: Identity,
    pub events: Vec<DrawEvent>,
}

/// ゲートウェイが保持する全状態
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub users: BTreeSet<Identity>,
    #[serde(default)]
    pub chat_history: Vec<ChatEvent>,
    #[serde(default)]
    pub drawings: Vec<DrawingRecord>,
}

impl PersistedState {
    /// ユーザーを追加。既に存在した場合は `false`
    pub fn add_user(&mut self, identity: &Identity) -> bool {
        self.users.insert(identity.clone())
    }

    pub fn push_chat(&mut self, event: &ChatEvent) {
        self.chat_history.push(event.clone());
    }

    pub fn push_drawing(&mut self, saved_by: &Identity, events: &[DrawEvent]) {
        self.drawings.push(DrawingRecord {
            saved_by: saved_by.clone(),
            events: events.to_vec(),
        });
    }

    /// 最新 `limit` 件を古い順で返す
    pub fn recent_chat(&self, limit: usize) -> Vec<ChatEvent> {
        let start = self.chat_history.len().saturating_sub(limit);
        self.chat_history[start..].to_vec()
    }

    pub fn latest_drawing(&self) -> Vec<DrawEvent> {
        self.drawings
            .last()
            .map(|record| record.events.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Point, Timestamp};

    fn identity(name: &str) -> Identity {
        Identity::new(name.to_string()).unwrap()
    }

    #[test]
    fn test_recent_chat_returns_newest_in_chronological_order() {
        // テスト項目: 最新 N 件が古い順で返される
        // given (前提条件):
        let mut state = PersistedState::default();
        for i in 0..5 {
            state.push_chat(&ChatEvent::new(
                identity("alice"),
                format!("message {i}"),
                Timestamp::new(i),
            ));
        }

        // when (操作):
        let recent = state.recent_chat(3);

        // then (期待する結果):
        let contents: Vec<&str> = recent.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["message 2", "message 3", "message 4"]);
    }

    #[test]
    fn test_recent_chat_with_limit_larger_than_history() {
        // テスト項目: 件数より大きい limit でも全件が返される
        // given (前提条件):
        let mut state = PersistedState::default();
        state.push_chat(&ChatEvent::new(
            identity("alice"),
            "only".to_string(),
            Timestamp::new(1),
        ));

        // when (操作):
        let recent = state.recent_chat(50);

        // then (期待する結果):
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn test_add_user_ignores_duplicates() {
        // テスト項目: 同じユーザーの追加は無視される（INSERT IGNORE 相当）
        // given (前提条件):
        let mut state = PersistedState::default();

        // when (操作):
        let first = state.add_user(&identity("alice"));
        let second = state.add_user(&identity("alice"));

        // then (期待する結果):
        assert!(first);
        assert!(!second);
        assert_eq!(state.users.len(), 1);
    }

    #[test]
    fn test_latest_drawing_is_last_saved() {
        // テスト項目: 最後に保存されたスナップショットが返される
        // given (前提条件):
        let mut state = PersistedState::default();
        let first = vec![DrawEvent::stroke_start(identity("alice"), Point::new(1, 1))];
        let second = vec![DrawEvent::clear(identity("bob"))];
        state.push_drawing(&identity("alice"), &first);
        state.push_drawing(&identity("bob"), &second);

        // when (操作):
        let latest = state.latest_drawing();

        // then (期待する結果):
        assert_eq!(latest, second);
        assert!(PersistedState::default().latest_drawing().is_empty());
    }
}
