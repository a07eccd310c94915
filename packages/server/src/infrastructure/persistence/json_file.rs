//! JSON ファイルを使った Persistence Gateway 実装
//!
//! 状態全体を 1 つの JSON ファイルに保持します。変更のたびに同じディレクトリの
//! 一意な一時ファイルへ書き出してから rename するため、途中で落ちても前回の内容が残ります。
//!
//! 書き込みはブロッキングタスク内で完結するため、呼び出し側の future が
//! タイムアウト等で破棄されても書きかけのファイルは残りません。
//! 各書き込みにはリビジョン番号を付け、古いリビジョンが新しい内容を上書きしないようにします。

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex as StdMutex, PoisonError},
};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::domain::{ChatEvent, DrawEvent, Identity, PersistenceError, PersistenceGateway};

use super::state::PersistedState;

#[derive(Debug)]
struct Store {
    state: PersistedState,
    closed: bool,
    /// Bumped on every flush
    revision: u64,
}

/// JSON ファイル Persistence Gateway 実装
#[derive(Debug)]
pub struct JsonFilePersistenceGateway {
    path: PathBuf,
    store: Mutex<Store>,
    /// Revision currently on disk
    written: Arc<StdMutex<u64>>,
}

impl JsonFilePersistenceGateway {
    /// ファイルを開く。存在しない場合は空の状態から始める
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(
            "Opened persistence file {} ({} chat message(s), {} drawing(s))",
            path.display(),
            state.chat_history.len(),
            state.drawings.len()
        );
        Ok(Self {
            path,
            store: Mutex::new(Store {
                state,
                closed: false,
                revision: 0,
            }),
            written: Arc::new(StdMutex::new(0)),
        })
    }

    async fn flush(&self, store: &mut Store) -> Result<(), PersistenceError> {
        store.revision += 1;
        let bytes = serde_json::to_vec_pretty(&store.state)?;
        let path = self.path.clone();
        let written = self.written.clone();
        let revision = store.revision;

        tokio::task::spawn_blocking(move || write_revision(&path, &bytes, revision, &written))
            .await
            .map_err(io::Error::other)?
    }
}

/// Atomically replace `path` with `bytes` unless a newer revision is already on disk.
fn write_revision(
    path: &Path,
    bytes: &[u8],
    revision: u64,
    written: &StdMutex<u64>,
) -> Result<(), PersistenceError> {
    let mut on_disk = written.lock().unwrap_or_else(PoisonError::into_inner);
    if *on_disk >= revision {
        return Ok(());
    }

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    *on_disk = revision;
    Ok(())
}

#[async_trait]
impl PersistenceGateway for JsonFilePersistenceGateway {
    async fn record_user(&self, identity: &Identity) -> Result<(), PersistenceError> {
        let mut store = self.store.lock().await;
        if store.closed {
            return Err(PersistenceError::Closed);
        }
        if store.state.add_user(identity) {
            self.flush(&mut store).await?;
        }
        Ok(())
    }

    async fn record_chat(&self, event: &ChatEvent) -> Result<(), PersistenceError> {
        let mut store = self.store.lock().await;
        if store.closed {
            return Err(PersistenceError::Closed);
        }
        store.state.push_chat(event);
        self.flush(&mut store).await
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
        self.flush(&mut store).await
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
        if store.closed {
            return Ok(());
        }
        store.closed = true;
        self.flush(&mut store).await?;
        tracing::info!("Persistence file {} closed", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::{Color, Timestamp};

    fn identity(name: &str) -> Identity {
        Identity::new(name.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_open_missing_file_starts_empty() {
        // テスト項目: 存在しないファイルを開くと空の状態から始まる
        // given (前提条件):
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rakugaki.json");

        // when (操作):
        let gateway = JsonFilePersistenceGateway::open(&path).await.unwrap();

        // then (期待する結果):
        assert!(gateway.recent_chat(50).await.unwrap().is_empty());
        assert!(gateway.latest_drawing_snapshot().await.unwrap().is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        // テスト項目: 書き込んだ内容が再オープン後も読み出せる
        // given (前提条件):
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rakugaki.json");
        let chat = ChatEvent::new(identity("alice"), "hi".to_string(), Timestamp::new(7));
        let drawing = vec![DrawEvent::set_color(identity("bob"), Color::RED)];
        {
            let gateway = JsonFilePersistenceGateway::open(&path).await.unwrap();
            gateway.record_user(&identity("alice")).await.unwrap();
            gateway.record_chat(&chat).await.unwrap();
            gateway
                .record_drawing_snapshot(&identity("bob"), &drawing)
                .await
                .unwrap();
            gateway.close().await.unwrap();
        }

        // when (操作):
        let reopened = JsonFilePersistenceGateway::open(&path).await.unwrap();

        // then (期待する結果):
        assert_eq!(reopened.recent_chat(50).await.unwrap(), vec![chat]);
        assert_eq!(reopened.latest_drawing_snapshot().await.unwrap(), drawing);
    }

    #[tokio::test]
    async fn test_open_corrupt_file_fails() {
        // テスト項目: 壊れた JSON ファイルはシリアライズエラーになる
        // given (前提条件):
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rakugaki.json");
        std::fs::write(&path, b"{not json").unwrap();

        // when (操作):
        let result = JsonFilePersistenceGateway::open(&path).await;

        // then (期待する結果):
        assert!(matches!(result, Err(PersistenceError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_cancelled_writes_leave_a_readable_file() {
        // テスト項目: 書き込み途中で破棄された呼び出しがあってもファイルは壊れず、最新の内容が残る
        // given (前提条件):
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rakugaki.json");
        let gateway = JsonFilePersistenceGateway::open(&path).await.unwrap();
        let chat = |n: i64| ChatEvent::new(identity("alice"), format!("line {n}"), Timestamp::new(n));

        // when (操作): 初回 poll の直後に破棄される書き込みと、完了する書き込みを交互に行う
        for n in 0..20 {
            let _ = tokio::time::timeout(Duration::ZERO, gateway.record_chat(&chat(2 * n))).await;
            gateway.record_chat(&chat(2 * n + 1)).await.unwrap();
        }
        let _ = tokio::time::timeout(Duration::ZERO, gateway.record_chat(&chat(40))).await;
        gateway.record_chat(&chat(41)).await.unwrap();

        // then (期待する結果):
        let reopened = JsonFilePersistenceGateway::open(&path).await.unwrap();
        let history = reopened.recent_chat(100).await.unwrap();
        assert_eq!(history.len(), 42);
        assert_eq!(history.last(), Some(&chat(41)));
    }

    #[tokio::test]
    async fn test_record_after_close_fails() {
        // テスト項目: close 後の書き込みは Closed エラーになる
        // given (前提条件):
        let dir = tempfile::tempdir().unwrap();
        let gateway = JsonFilePersistenceGateway::open(dir.path().join("rakugaki.json"))
            .await
            .unwrap();
        gateway.close().await.unwrap();

        // when (操作):
        let result = gateway.record_user(&identity("alice")).await;

        // then (期待する結果):
        assert!(matches!(result, Err(PersistenceError::Closed)));
    }
}
