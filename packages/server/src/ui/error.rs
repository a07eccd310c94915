//! Errors raised by the transport layer.

use std::io;

use thiserror::Error;

use crate::infrastructure::dto::ProtocolError;

/// Why a session ended abnormally.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    #[error("connection closed before login")]
    ClosedBeforeLogin,
}

/// Fatal server errors; the binary exits with status 1 on these.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    pub(crate) fn bind(addr: impl Into<String>, source: io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }
}
