//! Server configuration.

use std::{path::PathBuf, time::Duration};

use crate::{
    domain::ClearPolicy,
    usecase::{CoordinatorConfig, DEFAULT_CHAT_REPLAY_LIMIT, DEFAULT_PERSISTENCE_TIMEOUT},
};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 12345;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Everything the server needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Number of persisted chat lines replayed on join
    pub chat_replay_limit: usize,
    /// How long sessions may keep running after shutdown starts
    pub shutdown_grace: Duration,
    pub persistence_timeout: Duration,
    /// JSON file backing the persistence gateway; in-memory when `None`
    pub data_file: Option<PathBuf>,
    pub clear_policy: ClearPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            chat_replay_limit: DEFAULT_CHAT_REPLAY_LIMIT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            persistence_timeout: DEFAULT_PERSISTENCE_TIMEOUT,
            data_file: None,
            clear_policy: ClearPolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            chat_replay_limit: self.chat_replay_limit,
            persistence_timeout: self.persistence_timeout,
            clear_policy: self.clear_policy,
        }
    }
}
