//! Host Surfaces
//!
//! Traits for the collaborators the runtime hands documents and status
//! text to.

use crate::document::DocumentTree;
use bml_resource::ResourcePath;

/// Transpilation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("Document {0} is not valid text")]
    Encoding(String),

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}

/// Turns document bytes into a renderable tree
pub trait Renderer {
    /// Build the element tree of a document, with navigation style resolved
    fn transpile(&mut self, source: &[u8], path: &ResourcePath) -> Result<DocumentTree, RenderError>;

    /// Per-element fixups after the tree is installed
    fn post_process(&mut self, _tree: &mut DocumentTree) {}

    /// Present the current frame
    fn present(&mut self) {}
}

/// Operator-facing status display
pub trait StatusSink {
    fn set_status(&mut self, text: &str);

    /// Record a document transition with the host's context manager
    fn record_transition(&mut self, _from: Option<&str>, _to: &str) {}
}

/// Status sink that only logs
#[derive(Debug, Default)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn set_status(&mut self, text: &str) {
        tracing::debug!("Status: {}", text.replace('\n', " | "));
    }
}
