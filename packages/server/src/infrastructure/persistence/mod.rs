//! Persistence gateway の実装
//!
//! - `inmemory`: プロセス内メモリのみ（再起動で消える）
//! - `json_file`: 変更のたびに JSON ファイルへ書き出す

pub mod inmemory;
pub mod json_file;
mod state;

pub use inmemory::InMemoryPersistenceGateway;
pub use json_file::JsonFilePersistenceGateway;
pub use state::{DrawingRecord, PersistedState};
