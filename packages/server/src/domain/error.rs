//! Domain error types.

use std::time::Duration;

use thiserror::Error;

/// Value object construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    /// Identity was empty
    #[error("identity must not be empty")]
    EmptyIdentity,

    /// Stroke width was zero
    #[error("stroke width must be positive (got {0})")]
    InvalidStrokeWidth(u32),
}

/// Outbound delivery errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The session's writer side is gone
    #[error("session '{0}' is terminated")]
    Terminated(String),
}

/// Persistence gateway errors
///
/// Every variant is recoverable from the core's point of view: callers log
/// and carry on with live delivery.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Backend rejected or could not serve the call
    #[error("persistence backend unavailable: {0}")]
    Unavailable(String),

    /// Call did not finish in time
    #[error("persistence call timed out after {0:?}")]
    Timeout(Duration),

    /// Gateway was closed
    #[error("persistence gateway is closed")]
    Closed,

    #[error("persistence I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
