//! Wire protocol errors.

use thiserror::Error;

use crate::domain::ValueObjectError;

use super::websocket::MessageKind;

/// A message that cannot be accepted; terminates only the offending session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("'{kind:?}' message is missing field '{field}'")]
    MissingField {
        kind: MessageKind,
        field: &'static str,
    },

    #[error("invalid value: {0}")]
    InvalidValue(#[from] ValueObjectError),

    /// First message of a connection was not a join
    #[error("expected a join message, got '{0:?}'")]
    ExpectedJoin(MessageKind),

    /// Join sent on an already logged-in session
    #[error("session is already joined")]
    AlreadyJoined,

    #[error("identity '{0}' is reserved")]
    ReservedIdentity(String),

    #[error("binary frames are not supported")]
    BinaryFrame,
}
