//! Event Queue
//!
//! Single-flow FIFO of pending handler invocations with a nesting lock.
//! While the lock depth is above zero events accumulate but `pop_ready`
//! yields nothing.

use crate::event::{BeventEvent, IntrinsicEvent};
use std::collections::VecDeque;

/// Result of running a handler or a sequence of handlers
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The document asked to stop; unwind and let the runtime transition
    Exit,
}

impl Flow {
    pub fn is_exit(self) -> bool {
        matches!(self, Flow::Exit)
    }
}

/// Deferred task carried by an asynchronous event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncTask {
    /// Key handler; `activate` additionally queues a click on the target
    Key {
        event: IntrinsicEvent,
        handler: Option<String>,
        activate: bool,
    },
    /// Timer callback source
    Script { source: String },
    /// `onoccur` of a beitem
    Bevent { event: BeventEvent, handler: String },
}

/// Queued event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedEvent {
    Async(AsyncTask),
    Sync(IntrinsicEvent),
}

/// Event queue with lock depth
#[derive(Debug, Default)]
pub struct EventQueue {
    entries: VecDeque<QueuedEvent>,
    depth: u32,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the lock depth
    pub fn lock(&mut self) {
        self.depth += 1;
        tracing::trace!("Event queue locked (depth {})", self.depth);
    }

    /// Decrement the lock depth; an unpaired unlock clamps at zero
    pub fn unlock(&mut self) {
        if self.depth == 0 {
            tracing::warn!("Unpaired event queue unlock");
            return;
        }
        self.depth -= 1;
        tracing::trace!("Event queue unlocked (depth {})", self.depth);
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_locked(&self) -> bool {
        self.depth > 0
    }

    pub fn push_async(&mut self, task: AsyncTask) {
        self.entries.push_back(QueuedEvent::Async(task));
    }

    pub fn push_sync(&mut self, event: IntrinsicEvent) {
        self.entries.push_back(QueuedEvent::Sync(event));
    }

    /// Pop the head if draining is permitted
    pub fn pop_ready(&mut self) -> Option<QueuedEvent> {
        if self.is_locked() {
            return None;
        }
        self.entries.pop_front()
    }

    /// Clear all entries and the lock depth
    pub fn reset(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!("Discarding {} queued events", self.entries.len());
        }
        self.entries.clear();
        self.depth = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedEvent> {
        self.entries.iter()
    }
}
