//! The ordered record of draw events that reconstructs the canvas.

use super::entity::DrawEvent;

/// How a `Clear` event affects the history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClearPolicy {
    /// Keep pre-clear strokes; late joiners replay them followed by the clear.
    #[default]
    Retain,
    /// Truncate the history so replay starts at the clear.
    Reset,
}

/// Append-only log of draw events since the canvas was last reset.
///
/// The log itself is not synchronized: its owner serializes appends and
/// snapshots behind one lock, which is what rules out torn reads.
#[derive(Debug, Clone, Default)]
pub struct DrawHistoryLog {
    events: Vec<DrawEvent>,
    clear_policy: ClearPolicy,
}

impl DrawHistoryLog {
    pub fn new(clear_policy: ClearPolicy) -> Self {
        Self {
            events: Vec::new(),
            clear_policy,
        }
    }

    /// Rebuild a log from a previously saved snapshot.
    #[cfg(test)]
    pub fn from_events(events: Vec<DrawEvent>, clear_policy: ClearPolicy) -> Self {
        Self {
            events,
            clear_policy,
        }
    }

    pub fn append(&mut self, event: DrawEvent) {
        if event.is_clear() && self.clear_policy == ClearPolicy::Reset {
            self.events.clear();
        }
        self.events.push(event);
    }

    /// Full ordered copy of the log, for replay or saving.
    pub fn snapshot(&self) -> Vec<DrawEvent> {
        self.events.clone()
    }

    /// Replace the whole content, keeping the clear policy.
    pub fn restore(&mut self, events: Vec<DrawEvent>) {
        self.events = events;
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
