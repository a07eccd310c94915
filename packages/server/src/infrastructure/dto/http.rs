//! HTTP API response DTOs.

use serde::{Deserialize, Serialize};

use super::websocket::WireMessage;

/// Online participant (`GET /api/participants`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDto {
    pub identity: String,
    /// RFC 3339
    pub connected_at: String,
}

/// Current drawing (`GET /api/drawing`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawingDto {
    pub events: Vec<WireMessage>,
}
