//! BML Resources
//!
//! Broadcast module references, the module cache and the lock state
//! machine that gates which modules a document may reference.
//!
//! A module is addressed by `(component, module)` and is usable only
//! while it is cached *and* locked:
//!
//! ```rust,ignore
//! use bml_resource::{ModuleRegistry, ModuleKey, LockKind, Waiter};
//!
//! let mut registry = ModuleRegistry::default();
//! registry.set_program_map([key.component]);
//! registry.update_download_info(key.component, [(key.module, 0)]);
//! registry.lock(key, LockKind::Plain, waiter)?;
//! ```

mod cache;
mod path;
mod registry;

pub use cache::{CachedModule, ModuleCache};
pub use path::{
    parse_component_ref, ComponentId, ModuleId, ModuleKey, ReferenceError, ResourcePath,
    DATA_CAROUSEL_SCHEME,
};
pub use registry::{
    FetchError, FetchRequest, LockError, LockKind, LockOutcome, ModuleRegistry, Waiter,
};
