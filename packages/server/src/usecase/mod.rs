//! UseCase layer.

pub mod coordinator;

pub use coordinator::{
    BroadcastCoordinator, CoordinatorConfig, DEFAULT_CHAT_REPLAY_LIMIT,
    DEFAULT_PERSISTENCE_TIMEOUT, JoinOutcome,
};
