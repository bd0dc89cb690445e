//! Document Context
//!
//! Everything owned by the active document. The whole context is replaced
//! on a document swap and never merged.

use crate::document::DocumentTree;
use bml_events::{ElementId, EventQueue, TimerSet};
use bml_nav::FocusState;
use bml_resource::ResourcePath;
use std::collections::HashMap;

/// What a document timer does when it fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerAction {
    /// Queue a script for the interpreter
    Script(String),
    /// Compare watched modules against the download announcement
    ModuleWatch,
}

/// Last observed state of a module watched by a `ModuleUpdated` beitem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WatchedModule {
    pub status: i32,
    pub version: Option<u8>,
}

/// State of the active document
#[derive(Debug, Default)]
pub struct DocumentContext {
    pub path: Option<ResourcePath>,
    pub tree: DocumentTree,
    pub queue: EventQueue,
    pub focus: FocusState,
    pub timers: TimerSet<TimerAction>,
    pub(crate) watched_modules: HashMap<ElementId, WatchedModule>,
    pub(crate) message_versions: HashMap<ElementId, u8>,
}

impl DocumentContext {
    /// Fresh context for a document that has not been rendered yet
    pub fn new(path: ResourcePath) -> Self {
        Self {
            path: Some(path),
            ..Default::default()
        }
    }

    pub fn path_string(&self) -> Option<String> {
        self.path.as_ref().map(ToString::to_string)
    }
}
