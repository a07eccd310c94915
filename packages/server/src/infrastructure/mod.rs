//! Infrastructure layer: wire DTOs and persistence gateway implementations.

pub mod dto;
pub mod persistence;
