//! Conversion logic between DTOs and domain types.

use rakugaki_shared::time::timestamp_to_rfc3339;

use crate::domain::{
    ChatEvent, Color, DrawAction, DrawEvent, Identity, Point, ServerEvent, SessionHandle,
    StrokeWidth,
};

use super::{
    error::ProtocolError,
    http::ParticipantDto,
    websocket::{ColorDto, MessageKind, PointDto, WireMessage},
};

/// What a client asked for, in domain terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Join(Identity),
    Chat(String),
    Draw(DrawAction),
    SaveDrawing,
    Leave,
}

/// A decoded client message.
///
/// `claimed_identity` is what the client put in the `identity` field; the
/// server decides whether to trust it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub kind: MessageKind,
    pub claimed_identity: String,
    pub command: ClientCommand,
}

/// Decode one text frame.
pub fn decode_client_message(text: &str) -> Result<DecodedMessage, ProtocolError> {
    let wire: WireMessage = serde_json::from_str(text)?;
    DecodedMessage::try_from(wire)
}

/// Encode one outbound event as a text frame payload.
pub fn encode_server_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    let wire = match event {
        ServerEvent::Chat(chat) => WireMessage::from(chat),
        ServerEvent::Draw(draw) => WireMessage::from(draw),
    };
    serde_json::to_string(&wire)
}

// ========================================
// DTO → Domain
// ========================================

impl TryFrom<WireMessage> for DecodedMessage {
    type Error = ProtocolError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        let command = match wire.kind {
            MessageKind::Join => {
                let identity = Identity::new(wire.identity.clone())?;
                if identity.is_system() {
                    return Err(ProtocolError::ReservedIdentity(identity.into_string()));
                }
                ClientCommand::Join(identity)
            }
            MessageKind::Chat => ClientCommand::Chat(
                wire.payload
                    .clone()
                    .ok_or_else(|| missing(&wire, "payload"))?,
            ),
            MessageKind::Leave => ClientCommand::Leave,
            MessageKind::SaveDrawing => ClientCommand::SaveDrawing,
            MessageKind::StrokeStart => ClientCommand::Draw(DrawAction::StrokeStart {
                point: required_point(&wire)?,
            }),
            MessageKind::StrokePoint => ClientCommand::Draw(DrawAction::StrokePoint {
                point: required_point(&wire)?,
            }),
            MessageKind::StrokeEnd => ClientCommand::Draw(DrawAction::StrokeEnd),
            MessageKind::Clear => ClientCommand::Draw(DrawAction::Clear),
            MessageKind::SetColor => ClientCommand::Draw(DrawAction::SetColor {
                color: wire
                    .color
                    .map(Color::from)
                    .ok_or_else(|| missing(&wire, "color"))?,
            }),
            MessageKind::SetStrokeWidth => {
                let width = wire.width.ok_or_else(|| missing(&wire, "width"))?;
                ClientCommand::Draw(DrawAction::SetStrokeWidth {
                    width: StrokeWidth::new(width)?,
                })
            }
        };

        Ok(Self {
            kind: wire.kind,
            claimed_identity: wire.identity,
            command,
        })
    }
}

fn missing(wire: &WireMessage, field: &'static str) -> ProtocolError {
    ProtocolError::MissingField {
        kind: wire.kind,
        field,
    }
}

fn required_point(wire: &WireMessage) -> Result<Point, ProtocolError> {
    wire.point
        .map(Point::from)
        .ok_or_else(|| missing(wire, "point"))
}

impl From<PointDto> for Point {
    fn from(dto: PointDto) -> Self {
        Point::new(dto.x, dto.y)
    }
}

impl From<ColorDto> for Color {
    fn from(dto: ColorDto) -> Self {
        Color::rgb(dto.r, dto.g, dto.b)
    }
}

// ========================================
// Domain → DTO
// ========================================

impl From<&ChatEvent> for WireMessage {
    fn from(event: &ChatEvent) -> Self {
        WireMessage::chat(event.sender.as_str(), event.content.as_str())
            .with_timestamp(event.timestamp.value())
    }
}

impl From<&DrawEvent> for WireMessage {
    fn from(event: &DrawEvent) -> Self {
        let origin = event.origin.as_str();
        match event.action {
            DrawAction::StrokeStart { point } => {
                WireMessage::new(MessageKind::StrokeStart, origin).with_point(point.x, point.y)
            }
            DrawAction::StrokePoint { point } => {
                WireMessage::new(MessageKind::StrokePoint, origin).with_point(point.x, point.y)
            }
            DrawAction::StrokeEnd => WireMessage::new(MessageKind::StrokeEnd, origin),
            DrawAction::Clear => WireMessage::new(MessageKind::Clear, origin),
            DrawAction::SetColor { color } => {
                WireMessage::new(MessageKind::SetColor, origin).with_color(color.r, color.g, color.b)
            }
            DrawAction::SetStrokeWidth { width } => {
                WireMessage::new(MessageKind::SetStrokeWidth, origin).with_width(width.value())
            }
        }
    }
}

impl From<&SessionHandle> for ParticipantDto {
    fn from(session: &SessionHandle) -> Self {
        Self {
            identity: session.identity().as_str().to_string(),
            connected_at: timestamp_to_rfc3339(session.connected_at().value()),
        }
    }
}
