//! Rakugaki drawing board server.
//!
//! Participants join over WebSocket, share strokes and chat, and late joiners
//! get the current drawing replayed.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin rakugaki-server
//! cargo run --bin rakugaki-server -- 3000 --host 0.0.0.0 --data-file rakugaki.json
//! ```

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::Parser;
use rakugaki_server::{
    config::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SHUTDOWN_GRACE, ServerConfig},
    domain::{ClearPolicy, PersistenceGateway, SessionRegistry},
    infrastructure::persistence::{InMemoryPersistenceGateway, JsonFilePersistenceGateway},
    ui::Server,
    usecase::{BroadcastCoordinator, DEFAULT_CHAT_REPLAY_LIMIT, DEFAULT_PERSISTENCE_TIMEOUT},
};
use rakugaki_shared::{logger::setup_logger, time::SystemClock};

#[derive(Parser, Debug)]
#[command(name = "rakugaki-server")]
#[command(about = "Shared drawing board and chat server", long_about = None)]
struct Args {
    /// Port number to bind the server to
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// Number of recent chat messages replayed to a joining participant
    #[arg(long, default_value_t = DEFAULT_CHAT_REPLAY_LIMIT)]
    chat_replay_limit: usize,

    /// Seconds to let sessions finish after shutdown starts
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_GRACE.as_secs())]
    shutdown_grace_secs: u64,

    /// Upper bound for a single persistence call, in milliseconds
    #[arg(long, default_value_t = default_persistence_timeout_ms())]
    persistence_timeout_ms: u64,

    /// Persist users, chat and drawings to this JSON file (in-memory otherwise)
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Make `clear` drop the draw history so late joiners replay from the clear
    #[arg(long)]
    clear_resets_history: bool,
}

fn default_persistence_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_PERSISTENCE_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            chat_replay_limit: args.chat_replay_limit,
            shutdown_grace: Duration::from_secs(args.shutdown_grace_secs),
            persistence_timeout: Duration::from_millis(args.persistence_timeout_ms),
            data_file: args.data_file,
            clear_policy: if args.clear_resets_history {
                ClearPolicy::Reset
            } else {
                ClearPolicy::Retain
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let config = ServerConfig::from(Args::parse());

    // Initialize dependencies in order:
    // 1. Persistence gateway
    // 2. Registry + Coordinator
    // 3. Server

    // 1. Persistence gateway
    let gateway: Arc<dyn PersistenceGateway> = match &config.data_file {
        Some(path) => match JsonFilePersistenceGateway::open(path).await {
            Ok(gateway) => Arc::new(gateway),
            Err(e) => {
                tracing::error!("Failed to open {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => {
            tracing::info!("Using in-memory persistence");
            Arc::new(InMemoryPersistenceGateway::new())
        }
    };

    // 2. Registry + Coordinator
    let coordinator = Arc::new(BroadcastCoordinator::new(
        Arc::new(SessionRegistry::new()),
        gateway,
        Arc::new(SystemClock),
        config.coordinator_config(),
    ));
    coordinator.restore_drawing().await;

    // 3. Server
    let server = Server::new(coordinator, config);
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
