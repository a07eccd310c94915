//! WebSocket message DTOs.
//!
//! Every text frame carries exactly one [`WireMessage`] encoded as JSON.
//! The same flat shape is used in both directions.

use serde::{Deserialize, Serialize};

/// Message kind (`kind` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Join,
    Chat,
    Leave,
    SaveDrawing,
    StrokeStart,
    StrokePoint,
    StrokeEnd,
    Clear,
    SetColor,
    SetStrokeWidth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointDto {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorDto {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// One message on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub kind: MessageKind,
    pub identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<PointDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Server receipt time (Unix millis); only set on server → client chat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl WireMessage {
    pub fn new(kind: MessageKind, identity: impl Into<String>) -> Self {
        Self {
            kind,
            identity: identity.into(),
            payload: None,
            point: None,
            color: None,
            width: None,
            timestamp: None,
        }
    }

    pub fn join(identity: impl Into<String>) -> Self {
        Self::new(MessageKind::Join, identity).with_payload("")
    }

    pub fn chat(identity: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::new(MessageKind::Chat, identity).with_payload(payload)
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_point(mut self, x: i32, y: i32) -> Self {
        self.point = Some(PointDto { x, y });
        self
    }

    pub fn with_color(mut self, r: u8, g: u8, b: u8) -> Self {
        self.color = Some(ColorDto { r, g, b });
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
