//! Utilities shared by the Rakugaki packages.

pub mod logger;
pub mod time;
