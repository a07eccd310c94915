//! Request handlers for the WebSocket and HTTP endpoints.

mod http;
mod websocket;

pub use http::{get_drawing, get_participants, health_check};
pub use websocket::websocket_handler;
