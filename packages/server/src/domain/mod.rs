//! Domain layer: drawing/chat events, the draw history, sessions and the
//! registry of who is online.
//!
//! Persistence is reached only through the [`PersistenceGateway`] trait
//! defined here; implementations live in the infrastructure layer.

pub mod draw_history;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod session;
pub mod value_object;

pub use draw_history::{ClearPolicy, DrawHistoryLog};
pub use entity::{ChatEvent, DrawAction, DrawEvent, DrawKind, ServerEvent};
pub use error::{DeliveryError, PersistenceError, ValueObjectError};
pub use gateway::PersistenceGateway;
#[cfg(test)]
pub use gateway::MockPersistenceGateway;
pub use registry::SessionRegistry;
pub use session::{OutboundReceiver, OutboundSender, ReplayStats, SessionHandle, SessionPhase};
pub use value_object::{Color, Identity, Point, SYSTEM_IDENTITY, SessionId, StrokeWidth, Timestamp};
