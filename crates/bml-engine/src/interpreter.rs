//! Script Interpreter Interface
//!
//! The runtime drives scripts through this trait and gives each call
//! mutable access to the [`Browser`] so scripts can reach the browser API.

use crate::browser::Browser;
use bml_events::Flow;

/// Script execution error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("Syntax error in {label}: {message}")]
    Syntax { label: String, message: String },

    #[error("{0} is not defined")]
    Undefined(String),

    #[error("Call depth exceeded")]
    TooDeep,
}

/// Script interpreter used by the runtime.
///
/// Returning [`Flow::Exit`] stops the calling sequence; the runtime also
/// treats a transition requested through the browser API as an exit.
#[allow(async_fn_in_trait)]
pub trait Interpreter {
    /// Drop any suspended execution state
    fn reset_stack(&mut self);

    /// Discard all global state before a new document
    fn reset(&mut self);

    /// Evaluate a script block
    async fn add_script(&mut self, browser: &mut Browser, source: &str, label: &str) -> Result<Flow, ScriptError>;

    /// Run an event handler attribute body
    async fn execute_handler(&mut self, browser: &mut Browser, source: &str) -> Result<Flow, ScriptError>;
}
