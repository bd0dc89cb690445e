//! BML Events
//!
//! Event payloads, the single-flow event queue with its lock discipline,
//! and document timers.
//!
//! Ordering is strict FIFO. "Sync" and "async" describe the payload shape
//! (intrinsic event object vs. deferred task), not priority.

mod event;
mod queue;
mod timers;

pub use event::{
    BeventEvent, BeventType, CurrentEvent, ElementId, IntrinsicEvent, IntrinsicEventType,
};
pub use queue::{AsyncTask, EventQueue, Flow, QueuedEvent};
pub use timers::{Timer, TimerId, TimerSet};
