//! Data Transfer Objects (DTOs) for the drawing board.
//!
//! DTOs are organized by protocol:
//! - `websocket`: WebSocket message DTOs
//! - `http`: HTTP API response DTOs
//!
//! `conversion` maps them to and from domain types and owns decoding rules.

pub mod conversion;
pub mod error;
pub mod http;
pub mod websocket;

pub use conversion::{ClientCommand, DecodedMessage, decode_client_message, encode_server_event};
pub use error::ProtocolError;
