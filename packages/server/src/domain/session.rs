//! Outbound side of a connected session.
//!
//! Every session owns an unbounded queue drained by its own writer task, so
//! broadcasters never touch the socket. Until catch-up replay has been
//! enqueued, live deliveries are parked in a buffer and flushed right after
//! the replay content.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use super::{
    entity::{ChatEvent, ServerEvent},
    error::DeliveryError,
    value_object::{Identity, SessionId, Timestamp},
};

pub type OutboundSender = mpsc::UnboundedSender<ServerEvent>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// Observable delivery phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Registered, waiting for catch-up replay; live events are buffered
    Replaying,
    /// Live events go straight to the queue
    Active,
    /// Writer side is gone; deliveries fail
    Terminated,
}

#[derive(Debug)]
enum DeliveryState {
    Replaying(Vec<ServerEvent>),
    Active,
    Terminated,
}

#[derive(Debug)]
struct Outbox {
    sender: OutboundSender,
    state: Mutex<DeliveryState>,
}

/// Counts reported once replay has been handed off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub replayed: usize,
    pub flushed: usize,
    pub deduplicated: usize,
}

/// Cloneable handle to one session's outbound path.
///
/// Clones share the same queue and state; the registry and broadcasters hold
/// clones while the session's own task holds the receiver.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    identity: Identity,
    connected_at: Timestamp,
    outbox: Arc<Outbox>,
}

impl SessionHandle {
    /// Create a handle in the `Replaying` phase.
    pub fn new(identity: Identity, connected_at: Timestamp, sender: OutboundSender) -> Self {
        Self {
            id: SessionId::generate(),
            identity,
            connected_at,
            outbox: Arc::new(Outbox {
                sender,
                state: Mutex::new(DeliveryState::Replaying(Vec::new())),
            }),
        }
    }

    /// Create a handle together with the receiving end of its queue.
    pub fn channel(identity: Identity, connected_at: Timestamp) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(identity, connected_at, tx), rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    pub async fn phase(&self) -> SessionPhase {
        match *self.outbox.state.lock().await {
            DeliveryState::Replaying(_) => SessionPhase::Replaying,
            DeliveryState::Active => SessionPhase::Active,
            DeliveryState::Terminated => SessionPhase::Terminated,
        }
    }

    /// Queue an event for this session.
    ///
    /// Never blocks on I/O. A closed queue marks the session terminated and
    /// is reported to the caller, who is expected to log and move on.
    pub async fn deliver(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        let mut state = self.outbox.state.lock().await;
        if let DeliveryState::Replaying(buffer) = &mut *state {
            buffer.push(event);
            return Ok(());
        }
        if matches!(*state, DeliveryState::Terminated) {
            return Err(self.terminated());
        }
        if self.outbox.sender.send(event).is_err() {
            *state = DeliveryState::Terminated;
            return Err(self.terminated());
        }
        Ok(())
    }

    /// Enqueue catch-up content, flush buffered live events, go `Active`.
    ///
    /// Buffered chat events identical to a replayed one are dropped, each
    /// replayed event cancelling at most one buffered event.
    pub async fn complete_replay(
        &self,
        replay: Vec<ServerEvent>,
    ) -> Result<ReplayStats, DeliveryError> {
        let mut state = self.outbox.state.lock().await;
        let buffered = match std::mem::replace(&mut *state, DeliveryState::Active) {
            DeliveryState::Replaying(buffered) => buffered,
            DeliveryState::Active => {
                tracing::warn!(
                    "Replay already completed for '{}', ignoring second replay",
                    self.identity
                );
                return Ok(ReplayStats::default());
            }
            DeliveryState::Terminated => {
                *state = DeliveryState::Terminated;
                return Err(self.terminated());
            }
        };

        let buffered_len = buffered.len();
        let live = drop_replayed_chat(&replay, buffered);
        let stats = ReplayStats {
            replayed: replay.len(),
            flushed: live.len(),
            deduplicated: buffered_len - live.len(),
        };

        for event in replay.into_iter().chain(live) {
            if self.outbox.sender.send(event).is_err() {
                *state = DeliveryState::Terminated;
                return Err(self.terminated());
            }
        }

        Ok(stats)
    }

    /// Mark the session terminated. Returns `false` if it already was.
    pub async fn terminate(&self) -> bool {
        let mut state = self.outbox.state.lock().await;
        if matches!(*state, DeliveryState::Terminated) {
            return false;
        }
        *state = DeliveryState::Terminated;
        true
    }

    fn terminated(&self) -> DeliveryError {
        DeliveryError::Terminated(self.identity.as_str().to_string())
    }
}

fn drop_replayed_chat(replay: &[ServerEvent], buffered: Vec<ServerEvent>) -> Vec<ServerEvent> {
    let mut pending: Vec<&ChatEvent> = replay
        .iter()
        .filter_map(|event| match event {
            ServerEvent::Chat(chat) => Some(chat),
            ServerEvent::Draw(_) => None,
        })
        .collect();

    buffered
        .into_iter()
        .filter(|event| match event {
            ServerEvent::Chat(chat) => {
                match pending.iter().position(|replayed| *replayed == chat) {
                    Some(index) => {
                        pending.swap_remove(index);
                        false
                    }
                    None => true,
                }
            }
            ServerEvent::Draw(_) => true,
        })
        .collect()
}
