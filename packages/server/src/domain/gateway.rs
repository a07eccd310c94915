//! Persistence gateway trait 定義
//!
//! チャット履歴・描画スナップショットの永続化ストアへのインターフェース。
//! コアはこの trait にのみ依存し、具体的な実装は Infrastructure 層が提供します。
//!
//! すべての呼び出しは失敗しうるものとして扱われ、失敗してもライブ配信は継続します。

use async_trait::async_trait;

use super::{
    entity::{ChatEvent, DrawEvent},
    error::PersistenceError,
    value_object::Identity,
};

/// Durable storage for users, chat and drawing snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// ユーザーを記録（既に存在する場合は何もしない）
    async fn record_user(&self, identity: &Identity) -> Result<(), PersistenceError>;

    /// チャットメッセージを受信順に追記
    async fn record_chat(&self, event: &ChatEvent) -> Result<(), PersistenceError>;

    /// 描画スナップショットを保存者の identity と共に記録
    async fn record_drawing_snapshot(
        &self,
        identity: &Identity,
        events: &[DrawEvent],
    ) -> Result<(), PersistenceError>;

    /// 最新 `limit` 件のチャットを時系列順（古い順）で取得
    async fn recent_chat(&self, limit: usize) -> Result<Vec<ChatEvent>, PersistenceError>;

    /// 最後に保存された描画スナップショットを取得（無ければ空）
    async fn latest_drawing_snapshot(&self) -> Result<Vec<DrawEvent>, PersistenceError>;

    /// ゲートウェイを閉じる。以降の呼び出しは `PersistenceError::Closed` を返す
    async fn close(&self) -> Result<(), PersistenceError>;
}
