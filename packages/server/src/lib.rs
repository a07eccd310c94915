//! Rakugaki: a shared drawing board with chat over WebSocket.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
