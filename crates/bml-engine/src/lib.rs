//! BML Engine
//!
//! Receiver-side execution of broadcast BML documents: the document
//! lifecycle, event dispatch, broadcast events and the script-facing
//! browser API.
//!
//! ```rust,ignore
//! use bml_engine::{DocumentRuntime, RuntimeConfig, StubInterpreter, MemoryStore, LogStatus};
//!
//! let mut runtime = DocumentRuntime::new(
//!     RuntimeConfig::default(),
//!     StubInterpreter::new(),
//!     renderer,
//!     Box::new(MemoryStore::new()),
//!     Box::new(LogStatus),
//! );
//! smol::block_on(runtime.launch_document("/40/0000/startup.bml"));
//! ```

mod bevent;
mod browser;
mod config;
mod context;
mod document;
mod interpreter;
mod persistent;
mod render;
mod runtime;
mod stub_interpreter;

pub use bevent::{EventMessage, ANY_MESSAGE};
pub use browser::{Browser, LockedModuleInfo, ProgramInfo, Transition};
pub use config::RuntimeConfig;
pub use context::{DocumentContext, TimerAction};
pub use document::{Beitem, DocumentTree, Element, ScriptBlock};
pub use interpreter::{Interpreter, ScriptError};
pub use persistent::{
    unix_now, ArraySchema, FieldType, MemoryStore, PersistentStore, PersistentValue, SchemaError,
    StorageError, StoredArray,
};
pub use render::{LogStatus, RenderError, Renderer, StatusSink};
pub use runtime::DocumentRuntime;
pub use stub_interpreter::StubInterpreter;

// Re-export the lower layers for hosts
pub use bml_events;
pub use bml_nav;
pub use bml_resource;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
