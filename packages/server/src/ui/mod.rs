//! WebSocket + HTTP transport.

pub mod error;
mod handler;
mod server;
mod signal;
pub mod state;

pub use error::{ServerError, SessionError};
pub use server::{BoundServer, Server, router};
pub use signal::shutdown_signal;
