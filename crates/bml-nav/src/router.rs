//! Key Router
//!
//! Routes logical keys to the focused element: key-group filtering,
//! directional focus movement over the navigation graph, and queueing of
//! key handlers.

use crate::keys::{AribKey, Direction};
use crate::style::NavStyle;
use bml_events::{AsyncTask, ElementId, EventQueue, IntrinsicEvent, IntrinsicEventType};
use std::collections::HashSet;

/// Read access to the focusable elements of a document
pub trait FocusGraph {
    /// Computed navigation style of an element
    fn nav_style(&self, id: ElementId) -> Option<&NavStyle>;

    /// First element in document order carrying `nav-index: index`
    fn find_nav_index(&self, index: u16) -> Option<ElementId>;

    /// Handler source registered on an element for an intrinsic event
    fn handler(&self, id: ElementId, event: IntrinsicEventType) -> Option<&str>;
}

/// Current focus of a document
#[derive(Debug, Default)]
pub struct FocusState {
    focused: Option<ElementId>,
}

impl FocusState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focused(&self) -> Option<ElementId> {
        self.focused
    }

    /// Move focus, queueing blur for the old target and focus for the new one
    pub fn focus(&mut self, id: ElementId, queue: &mut EventQueue) -> bool {
        if self.focused == Some(id) {
            return false;
        }
        if let Some(old) = self.focused.replace(id) {
            queue.push_sync(IntrinsicEvent::new(IntrinsicEventType::Blur, old));
        }
        queue.push_sync(IntrinsicEvent::new(IntrinsicEventType::Focus, id));
        tracing::debug!("Focus -> {}", id);
        true
    }

    /// Drop focus without events
    pub fn clear(&mut self) {
        self.focused = None;
    }
}

/// Why a key was not delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyIgnored {
    NoFocus,
    Filtered,
}

/// What the router did with a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDispatch {
    /// The data button bypasses focus; the caller raises DataButtonPressed
    DataButton,
    Ignored(KeyIgnored),
    Delivered { focus_moved: bool, queued: bool },
}

/// Focus the element with navigation index 0, if any
pub fn focus_initial(focus: &mut FocusState, graph: &impl FocusGraph, queue: &mut EventQueue) -> bool {
    match graph.find_nav_index(0) {
        Some(id) => focus.focus(id, queue),
        None => false,
    }
}

/// Follow a directional link, continuing through hidden targets.
///
/// A cycle of hidden elements is a dead end like a missing link.
pub fn resolve_direction(graph: &impl FocusGraph, from: ElementId, direction: Direction) -> Option<ElementId> {
    let mut visited = HashSet::from([from]);
    let mut style = graph.nav_style(from)?;

    loop {
        let index = style.links.get(direction)?;
        let next = graph.find_nav_index(index)?;
        if !visited.insert(next) {
            return None;
        }
        let next_style = graph.nav_style(next)?;
        if next_style.is_hidden() {
            style = next_style;
            continue;
        }
        return Some(next);
    }
}

fn check_filter(key: AribKey, focus: &FocusState, graph: &impl FocusGraph) -> Result<ElementId, KeyIgnored> {
    let target = focus.focused().ok_or(KeyIgnored::NoFocus)?;
    let style = graph.nav_style(target).ok_or(KeyIgnored::NoFocus)?;
    if style.used_keys.permits(key) {
        Ok(target)
    } else {
        Err(KeyIgnored::Filtered)
    }
}

/// Route a key press
pub fn key_down(
    key: AribKey,
    focus: &mut FocusState,
    graph: &impl FocusGraph,
    queue: &mut EventQueue,
) -> KeyDispatch {
    if key == AribKey::DataButton {
        return KeyDispatch::DataButton;
    }

    let current = match check_filter(key, focus, graph) {
        Ok(target) => target,
        Err(reason) => return KeyDispatch::Ignored(reason),
    };

    let mut focus_moved = false;
    if let Some(direction) = key.direction() {
        if let Some(next) = resolve_direction(graph, current, direction) {
            focus_moved = focus.focus(next, queue);
        }
    }

    let Some(target) = focus.focused() else {
        return KeyDispatch::Ignored(KeyIgnored::NoFocus);
    };
    let handler = graph.handler(target, IntrinsicEventType::KeyDown).map(str::to_string);
    let activate = key == AribKey::Enter;
    if handler.is_none() && !activate {
        return KeyDispatch::Delivered { focus_moved, queued: false };
    }

    queue.push_async(AsyncTask::Key {
        event: IntrinsicEvent::key(IntrinsicEventType::KeyDown, key.code(), target),
        handler,
        activate,
    });
    KeyDispatch::Delivered { focus_moved, queued: true }
}

/// Route a key release. Never moves focus or activates.
pub fn key_up(key: AribKey, focus: &FocusState, graph: &impl FocusGraph, queue: &mut EventQueue) -> KeyDispatch {
    if key == AribKey::DataButton {
        return KeyDispatch::Ignored(KeyIgnored::Filtered);
    }

    let target = match check_filter(key, focus, graph) {
        Ok(target) => target,
        Err(reason) => return KeyDispatch::Ignored(reason),
    };

    let Some(handler) = graph.handler(target, IntrinsicEventType::KeyUp) else {
        return KeyDispatch::Delivered { focus_moved: false, queued: false };
    };
    queue.push_async(AsyncTask::Key {
        event: IntrinsicEvent::key(IntrinsicEventType::KeyUp, key.code(), target),
        handler: Some(handler.to_string()),
        activate: false,
    });
    KeyDispatch::Delivered { focus_moved: false, queued: true }
}
