//! UseCase: ブロードキャストコーディネーター
//!
//! 参加者の入退室、チャット・描画イベントの配信、描画履歴の管理をまとめて扱う。
//!
//! ## 順序保証
//!
//! 描画履歴のロックを「配信の順序付けロック」として使う。
//! 全ての配信（チャット・描画・システム通知）と、Registry への登録・解除は
//! このロックを保持したまま行われるため、各受信者のキューには
//! コーディネーターが受理した順にイベントが積まれる。
//! 配信はキューへの追加のみで I/O を待たないので、ロック保持中に遅いピアを待つことはない。
//! Persistence gateway の呼び出しはロックの外で行う。
//!
//! ## 配信待ちチャット
//!
//! チャットは記録してから配信するため、記録済みで未配信のチャットが存在しうる。
//! これらは記録前に「配信待ち」として登録し、順序付けロック下の配信時に外す。
//! join はリプレイの確定を順序付けロック下で行い、配信待ちのチャットを
//! リプレイから除く（ライブで届くため）。
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - broadcast_chat / broadcast_draw の送信者除外と順序
//! - join 時のリプレイ（チャット履歴 → 描画履歴 → ライブイベント）
//! - leave の一回性、同一 identity の後勝ち登録
//! - Persistence gateway の失敗・遅延時にも配信が継続すること
//!
//! ### どのような状況を想定しているか
//! - 正常系：複数参加者間の描画・チャット
//! - 異常系：切断済みセッション、gateway の障害
//! - エッジケース：リプレイ中に届くライブイベント、Clear 後の途中参加

use std::{
    future::Future,
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::Duration,
};

use rakugaki_shared::time::Clock;
use tokio::sync::{Mutex, MutexGuard};

use crate::domain::{
    ChatEvent, ClearPolicy, DeliveryError, DrawEvent, DrawHistoryLog, Identity, PersistenceError,
    PersistenceGateway, ReplayStats, ServerEvent, SessionHandle, SessionId, SessionRegistry,
    Timestamp,
};

/// Default number of persisted chat lines replayed to a new participant.
pub const DEFAULT_CHAT_REPLAY_LIMIT: usize = 50;
/// Default upper bound on any single persistence call.
pub const DEFAULT_PERSISTENCE_TIMEOUT: Duration = Duration::from_secs(2);

const SHUTDOWN_NOTICE: &str = "Server is shutting down";

/// コーディネーターの設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// join 時にリプレイするチャット履歴の最大件数
    pub chat_replay_limit: usize,
    /// Persistence gateway 呼び出し 1 回あたりのタイムアウト
    pub persistence_timeout: Duration,
    /// Clear イベントが描画履歴に与える影響
    pub clear_policy: ClearPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            chat_replay_limit: DEFAULT_CHAT_REPLAY_LIMIT,
            persistence_timeout: DEFAULT_PERSISTENCE_TIMEOUT,
            clear_policy: ClearPolicy::default(),
        }
    }
}

/// join の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// 同じ identity で登録済みだったため置き換えられたセッション
    pub replaced: Option<SessionId>,
    pub replay: ReplayStats,
}

/// ブロードキャストコーディネーター
///
/// サーバー起動時に作成され、全セッションから共有される。
pub struct BroadcastCoordinator {
    /// 接続中セッションの Registry
    registry: Arc<SessionRegistry>,
    /// 描画履歴（配信の順序付けロックを兼ねる）
    history: Mutex<DrawHistoryLog>,
    /// Persistence gateway（永続化の抽象化）
    gateway: Arc<dyn PersistenceGateway>,
    /// 記録開始済みで未配信のチャット
    in_flight_chat: StdMutex<InFlightChats>,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
}

#[derive(Debug, Default)]
struct InFlightChats {
    next_ticket: u64,
    entries: Vec<(u64, ChatEvent)>,
}

/// 配信待ちチャットの登録。drop で登録を外す
struct InFlightTicket<'a> {
    chats: &'a StdMutex<InFlightChats>,
    ticket: u64,
}

impl Drop for InFlightTicket<'_> {
    fn drop(&mut self) {
        let mut chats = self.chats.lock().unwrap_or_else(PoisonError::into_inner);
        chats.entries.retain(|(ticket, _)| *ticket != self.ticket);
    }
}

impl BroadcastCoordinator {
    /// 新しい BroadcastCoordinator を作成
    pub fn new(
        registry: Arc<SessionRegistry>,
        gateway: Arc<dyn PersistenceGateway>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            history: Mutex::new(DrawHistoryLog::new(config.clear_policy)),
            gateway,
            in_flight_chat: StdMutex::new(InFlightChats::default()),
            clock,
            config,
        }
    }

    /// 現在時刻（受信時刻の付与に使う）
    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    /// 最後に保存された描画スナップショットから描画履歴を復元
    ///
    /// 接続受付開始前に一度だけ呼ぶ。失敗時は空の履歴のまま続行する。
    ///
    /// # Returns
    ///
    /// 復元したイベント数
    pub async fn restore_drawing(&self) -> usize {
        match self.guarded(self.gateway.latest_drawing_snapshot()).await {
            Ok(events) => {
                let restored = events.len();
                self.history.lock().await.restore(events);
                tracing::info!("Restored {} draw event(s) from the last snapshot", restored);
                restored
            }
            Err(e) => {
                tracing::warn!("Failed to load the last drawing snapshot: {}", e);
                0
            }
        }
    }

    /// 参加者の join を処理
    ///
    /// 1. 順序付けロック下で Registry に登録し、描画履歴のスナップショットを取る
    ///    （以降の描画イベントはリプレイ待ちバッファに入る）
    /// 2. 入室通知を全員に配信（本人にはリプレイの後に届く）
    /// 3. ユーザーを記録し、チャット履歴を取得
    /// 4. 順序付けロック下で、配信待ちのチャットを除いたチャット履歴 → 描画履歴の順で
    ///    リプレイし、バッファを流す
    ///
    /// # Returns
    ///
    /// * `Ok(JoinOutcome)` - リプレイ完了
    /// * `Err(DeliveryError)` - リプレイ前にセッションが終了していた
    pub async fn join(&self, session: SessionHandle) -> Result<JoinOutcome, DeliveryError> {
        let identity = session.identity().clone();

        let (replaced, drawing) = {
            let history = self.history.lock().await;
            let replaced = self.registry.register(session.clone()).await;
            let notice = ChatEvent::system(format!("{identity} has joined the room"), self.now());
            self.fan_out(&history, notice.into(), None).await;
            (replaced, history.snapshot())
        };

        if let Some(previous) = &replaced {
            tracing::warn!(
                "Identity '{}' was already registered (session {}); replaced by session {}",
                identity,
                previous.id(),
                session.id()
            );
        }

        if let Err(e) = self.guarded(self.gateway.record_user(&identity)).await {
            tracing::warn!("Failed to record user '{}': {}", identity, e);
        }

        let chat = match self
            .guarded(self.gateway.recent_chat(self.config.chat_replay_limit))
            .await
        {
            Ok(chat) => chat,
            Err(e) => {
                tracing::warn!("Failed to load chat history for '{}': {}", identity, e);
                Vec::new()
            }
        };

        let stats = {
            let _sequenced = self.history.lock().await;
            let replay: Vec<ServerEvent> = self
                .without_in_flight(chat)
                .into_iter()
                .map(ServerEvent::Chat)
                .chain(drawing.into_iter().map(ServerEvent::Draw))
                .collect();
            session.complete_replay(replay).await?
        };

        tracing::info!(
            "Replayed {} event(s) to '{}' and flushed {} live event(s)",
            stats.replayed,
            identity,
            stats.flushed
        );

        Ok(JoinOutcome {
            replaced: replaced.map(|previous| previous.id()),
            replay: stats,
        })
    }

    /// 参加者の退室を処理
    ///
    /// セッション自身の登録が残っていた場合のみ Registry から削除し、退室通知を配信する。
    /// 同じセッションで何度呼んでも削除・通知は一度だけ。
    ///
    /// # Returns
    ///
    /// このセッションの登録を削除した場合 `true`
    pub async fn leave(&self, session: &SessionHandle) -> bool {
        session.terminate().await;

        let history = self.history.lock().await;
        let removed = self
            .registry
            .unregister(session.identity(), session.id())
            .await
            .is_some();

        if removed {
            let notice = ChatEvent::system(
                format!("{} has left the room", session.identity()),
                self.now(),
            );
            self.fan_out(&history, notice.into(), None).await;
        } else {
            tracing::debug!(
                "Session {} of '{}' was not registered; no leave notice",
                session.id(),
                session.identity()
            );
        }

        removed
    }

    /// チャットを記録し、送信者以外の全員に配信
    ///
    /// 記録を先に行うため、遅い gateway はこの配信の遅延にのみ影響する。
    /// 記録の失敗はログに残し、配信は続行する。
    ///
    /// # Returns
    ///
    /// 配信できたセッション数
    pub async fn broadcast_chat(&self, event: ChatEvent) -> usize {
        let ticket = self.track_in_flight(&event);
        if let Err(e) = self.guarded(self.gateway.record_chat(&event)).await {
            tracing::warn!("Failed to persist chat from '{}': {}", event.sender, e);
        }

        let sender = event.sender.clone();
        let history = self.history.lock().await;
        drop(ticket);
        self.fan_out(&history, event.into(), Some(&sender)).await
    }

    /// 描画履歴に追記し、送信者以外の全員に配信
    ///
    /// # Returns
    ///
    /// 配信できたセッション数
    pub async fn broadcast_draw(&self, event: DrawEvent) -> usize {
        let origin = event.origin.clone();
        let mut history = self.history.lock().await;
        history.append(event.clone());
        self.fan_out(&history, event.into(), Some(&origin)).await
    }

    /// システム通知を全員に配信
    pub async fn broadcast_system(&self, content: &str) -> usize {
        let notice = ChatEvent::system(content, self.now());
        let history = self.history.lock().await;
        self.fan_out(&history, notice.into(), None).await
    }

    /// シャットダウン通知を全員に配信（ベストエフォート）
    pub async fn announce_shutdown(&self) -> usize {
        let delivered = self.broadcast_system(SHUTDOWN_NOTICE).await;
        tracing::info!("Shutdown notice delivered to {} session(s)", delivered);
        delivered
    }

    /// 現在の描画履歴を `identity` の名義でスナップショットとして保存
    ///
    /// # Returns
    ///
    /// 保存したイベント数
    pub async fn save_drawing(&self, identity: &Identity) -> Result<usize, PersistenceError> {
        let events = self.history_snapshot().await;
        self.guarded(self.gateway.record_drawing_snapshot(identity, &events))
            .await?;
        tracing::info!(
            "Saved drawing snapshot of {} event(s) for '{}'",
            events.len(),
            identity
        );
        Ok(events.len())
    }

    /// 描画履歴のスナップショット
    pub async fn history_snapshot(&self) -> Vec<DrawEvent> {
        self.history.lock().await.snapshot()
    }

    /// 接続中の参加者（identity 順）
    pub async fn participants(&self) -> Vec<SessionHandle> {
        let mut sessions = self.registry.snapshot_all().await;
        sessions.sort_by(|a, b| a.identity().cmp(b.identity()));
        sessions
    }

    /// Persistence gateway を閉じる（シャットダウンの最後に呼ぶ）
    pub async fn close_gateway(&self) {
        if let Err(e) = self.guarded(self.gateway.close()).await {
            tracing::warn!("Failed to close persistence gateway: {}", e);
        }
    }

    /// 順序付けロックを保持した状態で、`exclude` 以外の全セッションに配信
    ///
    /// 個々の配信失敗はログに残すだけで、他の受信者への配信は続ける。
    async fn fan_out(
        &self,
        _sequenced: &MutexGuard<'_, DrawHistoryLog>,
        event: ServerEvent,
        exclude: Option<&Identity>,
    ) -> usize {
        let mut delivered = 0;
        for session in self.registry.snapshot_all().await {
            if exclude.is_some_and(|excluded| excluded == session.identity()) {
                continue;
            }
            match session.deliver(event.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!("Failed to deliver to '{}': {}", session.identity(), e);
                }
            }
        }
        delivered
    }

    fn track_in_flight(&self, event: &ChatEvent) -> InFlightTicket<'_> {
        let mut chats = self
            .in_flight_chat
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let ticket = chats.next_ticket;
        chats.next_ticket += 1;
        chats.entries.push((ticket, event.clone()));
        InFlightTicket {
            chats: &self.in_flight_chat,
            ticket,
        }
    }

    /// Drop history entries matching a chat that is still waiting for fan-out.
    ///
    /// Each in-flight chat cancels at most one history entry.
    fn without_in_flight(&self, history: Vec<ChatEvent>) -> Vec<ChatEvent> {
        let chats = self
            .in_flight_chat
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut pending: Vec<&ChatEvent> = chats.entries.iter().map(|(_, chat)| chat).collect();
        history
            .into_iter()
            .filter(|chat| match pending.iter().position(|p| *p == chat) {
                Some(index) => {
                    pending.swap_remove(index);
                    false
                }
                None => true,
            })
            .collect()
    }

    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, PersistenceError>>,
    ) -> Result<T, PersistenceError> {
        let limit = self.config.persistence_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(PersistenceError::Timeout(limit)))
    }
}
