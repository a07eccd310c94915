//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{
    infrastructure::dto::{
        http::{DrawingDto, ParticipantDto},
        websocket::WireMessage,
    },
    ui::state::AppState,
};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Online participants, sorted by identity
pub async fn get_participants(State(state): State<Arc<AppState>>) -> Json<Vec<ParticipantDto>> {
    let participants = state.coordinator.participants().await;

    // Domain Model から DTO への変換
    Json(participants.iter().map(ParticipantDto::from).collect())
}

/// Current drawing
pub async fn get_drawing(State(state): State<Arc<AppState>>) -> Json<DrawingDto> {
    let events = state.coordinator.history_snapshot().await;

    // Domain Model から DTO への変換
    Json(DrawingDto {
        events: events.iter().map(WireMessage::from).collect(),
    })
}
