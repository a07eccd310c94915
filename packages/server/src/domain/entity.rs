//! Domain entities: chat and draw events.

use serde::{Deserialize, Serialize};

use super::value_object::{Color, Identity, Point, StrokeWidth, Timestamp};

/// A chat line as received by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub sender: Identity,
    pub content: String,
    /// Server receipt time
    pub timestamp: Timestamp,
}

impl ChatEvent {
    pub fn new(sender: Identity, content: String, timestamp: Timestamp) -> Self {
        Self {
            sender,
            content,
            timestamp,
        }
    }

    /// Chat-shaped notice sent from the reserved system identity.
    pub fn system(content: impl Into<String>, timestamp: Timestamp) -> Self {
        Self::new(Identity::system(), content.into(), timestamp)
    }

    pub fn is_system(&self) -> bool {
        self.sender.is_system()
    }
}

/// Discriminant of a [`DrawAction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawKind {
    StrokeStart,
    StrokePoint,
    StrokeEnd,
    Clear,
    SetColor,
    SetStrokeWidth,
}

/// What a draw event does to the canvas.
///
/// Each variant carries exactly the data its kind requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawAction {
    StrokeStart { point: Point },
    StrokePoint { point: Point },
    StrokeEnd,
    Clear,
    SetColor { color: Color },
    SetStrokeWidth { width: StrokeWidth },
}

impl DrawAction {
    pub fn kind(&self) -> DrawKind {
        match self {
            Self::StrokeStart { .. } => DrawKind::StrokeStart,
            Self::StrokePoint { .. } => DrawKind::StrokePoint,
            Self::StrokeEnd => DrawKind::StrokeEnd,
            Self::Clear => DrawKind::Clear,
            Self::SetColor { .. } => DrawKind::SetColor,
            Self::SetStrokeWidth { .. } => DrawKind::SetStrokeWidth,
        }
    }

    pub fn point(&self) -> Option<Point> {
        match self {
            Self::StrokeStart { point } | Self::StrokePoint { point } => Some(*point),
            _ => None,
        }
    }

    pub fn color(&self) -> Option<Color> {
        match self {
            Self::SetColor { color } => Some(*color),
            _ => None,
        }
    }

    pub fn width(&self) -> Option<StrokeWidth> {
        match self {
            Self::SetStrokeWidth { width } => Some(*width),
            _ => None,
        }
    }
}

/// A draw action attributed to the participant who performed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawEvent {
    pub origin: Identity,
    pub action: DrawAction,
}

impl DrawEvent {
    pub fn new(origin: Identity, action: DrawAction) -> Self {
        Self { origin, action }
    }

    pub fn stroke_start(origin: Identity, point: Point) -> Self {
        Self::new(origin, DrawAction::StrokeStart { point })
    }

    pub fn stroke_point(origin: Identity, point: Point) -> Self {
        Self::new(origin, DrawAction::StrokePoint { point })
    }

    pub fn stroke_end(origin: Identity) -> Self {
        Self::new(origin, DrawAction::StrokeEnd)
    }

    pub fn clear(origin: Identity) -> Self {
        Self::new(origin, DrawAction::Clear)
    }

    pub fn set_color(origin: Identity, color: Color) -> Self {
        Self::new(origin, DrawAction::SetColor { color })
    }

    pub fn set_stroke_width(origin: Identity, width: StrokeWidth) -> Self {
        Self::new(origin, DrawAction::SetStrokeWidth { width })
    }

    pub fn kind(&self) -> DrawKind {
        self.action.kind()
    }

    pub fn is_clear(&self) -> bool {
        self.kind() == DrawKind::Clear
    }
}

/// Anything the server pushes to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Chat(ChatEvent),
    Draw(DrawEvent),
}

impl From<ChatEvent> for ServerEvent {
    fn from(event: ChatEvent) -> Self {
        Self::Chat(event)
    }
}

impl From<DrawEvent> for ServerEvent {
    fn from(event: DrawEvent) -> Self {
        Self::Draw(event)
    }
}
