//! Browser API
//!
//! State shared between the runtime and running scripts, and the
//! script-facing `browser` calls. Calls report through numeric sentinels:
//! NaN for failure or pending, 1 for success, small negatives for specific
//! failure reasons.

use crate::config::RuntimeConfig;
use crate::context::{DocumentContext, TimerAction};
use crate::persistent::{unix_now, ArraySchema, PersistentStore, PersistentValue, StoredArray};
use crate::render::StatusSink;
use bml_events::{CurrentEvent, TimerId};
use bml_resource::{
    parse_component_ref, LockError, LockKind, LockOutcome, ModuleKey, ModuleRegistry,
    ResourcePath, Waiter,
};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;

/// Identifiers of the program currently on air
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProgramInfo {
    pub event_name: String,
    pub event_id: Option<u16>,
    pub service_id: Option<u16>,
    pub original_network_id: Option<u16>,
    pub transport_stream_id: Option<u16>,
}

/// A recorded document transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: Option<String>,
    pub to: String,
}

/// Entry of `getLockedModuleInfo`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedModuleInfo {
    pub module: String,
    /// 1 for a plain lock, 2 for an extended lock
    pub kind: u8,
    pub status: u8,
}

/// A resolved launch waiting for the current sequence to unwind
#[derive(Debug, Clone)]
pub(crate) struct PendingLaunch {
    pub path: ResourcePath,
    pub source: Vec<u8>,
}

/// Script-visible browser state
pub struct Browser {
    config: RuntimeConfig,
    registry: ModuleRegistry,
    pub(crate) document: DocumentContext,
    program: ProgramInfo,
    date_mode: u8,
    pending: Option<PendingLaunch>,
    store: Box<dyn PersistentStore>,
    status: Box<dyn StatusSink>,
    status_text: String,
    history: VecDeque<Transition>,
    pub(crate) in_unload: bool,
    pub(crate) current_event: Option<CurrentEvent>,
}

impl Browser {
    pub fn new(config: RuntimeConfig, store: Box<dyn PersistentStore>, status: Box<dyn StatusSink>) -> Self {
        let registry = ModuleRegistry::new(config.max_cached_modules, config.max_cache_bytes);
        Self {
            config,
            registry,
            document: DocumentContext::default(),
            program: ProgramInfo::default(),
            date_mode: 0,
            pending: None,
            store,
            status,
            status_text: String::new(),
            history: VecDeque::new(),
            in_unload: false,
            current_event: None,
        }
    }

    // === Accessors ===

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    pub fn document(&self) -> &DocumentContext {
        &self.document
    }

    pub fn active_path(&self) -> Option<&ResourcePath> {
        self.document.path.as_ref()
    }

    /// Event visible to the running handler
    pub fn current_event(&self) -> Option<&CurrentEvent> {
        self.current_event.as_ref()
    }

    pub fn program_info(&self) -> &ProgramInfo {
        &self.program
    }

    pub fn set_program_info(&mut self, program: ProgramInfo) {
        self.program = program;
    }

    pub fn date_mode(&self) -> u8 {
        self.date_mode
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Recent document transitions, oldest first
    pub fn history(&self) -> impl Iterator<Item = &Transition> {
        self.history.iter()
    }

    /// Whether a script asked for a new document
    pub fn transition_pending(&self) -> bool {
        self.pending.is_some()
    }

    // === Runtime hooks ===

    pub(crate) fn take_transition(&mut self) -> Option<PendingLaunch> {
        self.pending.take()
    }

    pub(crate) fn discard_transition(&mut self) {
        if let Some(launch) = self.pending.take() {
            tracing::warn!("Dropping transition to {} requested during unload", launch.path);
            self.release_launch_pin(launch.path.key);
        }
    }

    /// Drop the pin a launch took unless the active or pending document
    /// still lives in that module
    pub(crate) fn release_launch_pin(&mut self, key: ModuleKey) {
        let active = self.active_path().map(|p| p.key);
        let pending = self.pending.as_ref().map(|l| l.path.key);
        if active != Some(key) && pending != Some(key) {
            self.registry.unpin(key);
        }
    }

    pub(crate) fn publish_status(&mut self, text: String) {
        self.status.set_status(&text);
        self.status_text = text;
    }

    pub(crate) fn publish_active_status(&mut self) {
        let path = self.document.path_string().unwrap_or_default();
        let text = format!("{}\n{}", path, self.program.event_name);
        self.publish_status(text);
    }

    pub(crate) fn record_transition(&mut self, to: &ResourcePath) {
        let transition = Transition {
            from: self.document.path_string(),
            to: to.to_string(),
        };
        self.status.record_transition(transition.from.as_deref(), &transition.to);
        self.history.push_back(transition);
        while self.history.len() > self.config.transition_history {
            self.history.pop_front();
        }
    }

    /// Install a fresh document context and release all module state of
    /// the previous document. The new document's module is pinned, which
    /// scripts never see as a lock.
    pub(crate) fn begin_document(&mut self, path: ResourcePath) {
        let key = path.key;
        self.document = DocumentContext::new(path);
        self.registry.unlock_all();
        self.registry.unpin_all();
        if !self.registry.pin(key) {
            tracing::error!("Module {} left the cache during the swap", key);
        }
        self.date_mode = 0;
        self.current_event = None;
    }

    /// Teardown calls are the only ones allowed while `onunload` runs
    fn forbidden_in_unload(&self, call: &str) -> bool {
        if self.in_unload {
            tracing::warn!("browser.{} is not allowed in onunload", call);
        }
        self.in_unload
    }

    fn resolve(&self, call: &str, reference: &str) -> Option<ResourcePath> {
        match ResourcePath::parse(reference, self.active_path()) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("browser.{}: {}", call, e);
                None
            }
        }
    }

    // === Documents ===

    /// Request a document transition.
    ///
    /// Always returns NaN. When the module is resident the launch is
    /// recorded and the running handler unwinds; when it has to be
    /// downloaded the launch is retried once the fetch completes. A module
    /// that is not announced yet is fetched once it shows up.
    pub fn launch_document(&mut self, target: &str) -> f64 {
        if self.forbidden_in_unload("launchDocument") {
            return f64::NAN;
        }
        let Some(path) = self.resolve("launchDocument", target) else {
            return f64::NAN;
        };
        let key = path.key;

        self.publish_status(format!("Loading {}…\n{}", path, self.program.event_name));

        if !self.registry.component_present(key.component) {
            tracing::warn!("launchDocument: component {} is not in the program map", key.component);
            return f64::NAN;
        }

        if !self.registry.pin(key) {
            if !self.registry.module_announced(key) {
                tracing::info!("launchDocument: waiting for module {} to be announced", key);
            }
            self.registry.request_fetch(key, Waiter::Document { target: path.to_string() });
            return f64::NAN;
        }

        let Some(source) = self.registry.fetch_locked(&path).map(<[u8]>::to_vec) else {
            tracing::error!("launchDocument: {} has no such resource", path);
            self.release_launch_pin(key);
            return f64::NAN;
        };

        tracing::info!("Launching {}", path);
        if let Some(previous) = self.pending.replace(PendingLaunch { path, source }) {
            tracing::debug!("Launch of {} superseded", previous.path);
            self.release_launch_pin(previous.path.key);
        }
        f64::NAN
    }

    pub fn reload_active_document(&mut self) -> f64 {
        match self.document.path_string() {
            Some(path) => self.launch_document(&path),
            None => f64::NAN,
        }
    }

    pub fn get_active_document(&self) -> Option<String> {
        if self.forbidden_in_unload("getActiveDocument") {
            return None;
        }
        self.document.path_string()
    }

    // === Modules ===

    pub fn lock_module_on_memory(&mut self, reference: &str) -> f64 {
        if self.forbidden_in_unload("lockModuleOnMemory") {
            return f64::NAN;
        }
        let Some(path) = self.resolve("lockModuleOnMemory", reference) else {
            return f64::NAN;
        };
        let waiter = Waiter::Lock {
            reference: reference.to_string(),
            kind: LockKind::Plain,
        };
        match self.registry.lock(path.key, LockKind::Plain, waiter) {
            Ok(LockOutcome::AlreadyLocked) | Ok(LockOutcome::Pending) => 1.0,
            Ok(LockOutcome::Locked) => {
                self.notify_module_locked(reference, path.key, false, 0);
                1.0
            }
            Err(e) => {
                tracing::warn!("lockModuleOnMemory({}): {}", reference, e);
                -1.0
            }
        }
    }

    pub fn lock_module_on_memory_ex(&mut self, reference: &str) -> f64 {
        if self.forbidden_in_unload("lockModuleOnMemoryEx") {
            return f64::NAN;
        }
        let Some(path) = self.resolve("lockModuleOnMemoryEx", reference) else {
            return f64::NAN;
        };
        let waiter = Waiter::Lock {
            reference: reference.to_string(),
            kind: LockKind::Extended,
        };
        match self.registry.lock(path.key, LockKind::Extended, waiter) {
            Ok(LockOutcome::Pending) => 1.0,
            Ok(LockOutcome::Locked) | Ok(LockOutcome::AlreadyLocked) => {
                self.notify_module_locked(reference, path.key, true, 0);
                1.0
            }
            Err(LockError::ModuleNotAnnounced(key)) => {
                tracing::warn!("lockModuleOnMemoryEx: module {} is not announced", key);
                self.notify_module_locked(reference, key, true, -2);
                1.0
            }
            Err(e @ LockError::ComponentAbsent(_)) => {
                tracing::warn!("lockModuleOnMemoryEx({}): {}", reference, e);
                -3.0
            }
        }
    }

    /// Lock a module whose fetch completed and notify the document
    pub(crate) fn complete_lock(&mut self, reference: &str, key: ModuleKey, kind: LockKind) {
        let extended = kind.is_extended() || self.config.plain_async_lock_reports_extended;
        if self.registry.lock_cached(key, kind) {
            self.notify_module_locked(reference, key, extended, 0);
        } else {
            self.notify_module_locked(reference, key, extended, -1);
        }
    }

    pub fn unlock_module_on_memory(&mut self, reference: &str) -> f64 {
        self.unlock_module(reference, LockKind::Plain)
    }

    pub fn unlock_module_on_memory_ex(&mut self, reference: &str) -> f64 {
        self.unlock_module(reference, LockKind::Extended)
    }

    fn unlock_module(&mut self, reference: &str, kind: LockKind) -> f64 {
        let Some(path) = self.resolve("unlockModuleOnMemory", reference) else {
            return f64::NAN;
        };
        if self.registry.unlock(path.key, kind) {
            1.0
        } else {
            f64::NAN
        }
    }

    pub fn unlock_all_modules_on_memory(&mut self) -> f64 {
        self.registry.unlock_all();
        1.0
    }

    pub fn get_locked_module_info(&self) -> Vec<LockedModuleInfo> {
        if self.forbidden_in_unload("getLockedModuleInfo") {
            return Vec::new();
        }
        self.registry
            .locked_modules()
            .into_iter()
            .map(|(key, kind)| LockedModuleInfo {
                module: key.to_string(),
                kind: if kind.is_extended() { 2 } else { 1 },
                status: 1,
            })
            .collect()
    }

    /// 1 when the component is in the program map, 0 when not
    pub fn detect_component(&self, reference: &str) -> f64 {
        if self.forbidden_in_unload("detectComponent") {
            return f64::NAN;
        }
        match parse_component_ref(reference, self.active_path()) {
            Ok(component) if self.registry.component_present(component) => 1.0,
            Ok(_) => 0.0,
            Err(e) => {
                tracing::warn!("detectComponent: {}", e);
                f64::NAN
            }
        }
    }

    // === Program ===

    /// `1` event, `2` service, `3` original network, `4` transport stream
    pub fn get_program_id(&self, kind: u32) -> Option<String> {
        if self.forbidden_in_unload("getProgramID") {
            return None;
        }
        let id = match kind {
            1 => self.program.event_id,
            2 => self.program.service_id,
            3 => self.program.original_network_id,
            4 => self.program.transport_stream_id,
            _ => None,
        }?;
        Some(format!("0x{:04x}", id))
    }

    pub fn set_current_date_mode(&mut self, mode: i32) -> f64 {
        if self.forbidden_in_unload("setCurrentDateMode") {
            return f64::NAN;
        }
        match u8::try_from(mode) {
            Ok(mode @ (0 | 1)) => {
                self.date_mode = mode;
                1.0
            }
            _ => f64::NAN,
        }
    }

    // === Timers ===

    /// Run `source` every `msec`, `iterations` times (0 repeats until cleared)
    pub fn set_interval(&mut self, source: &str, msec: u64, iterations: u32) -> f64 {
        if self.forbidden_in_unload("setInterval") {
            return f64::NAN;
        }
        let id = self.document.timers.schedule(
            TimerAction::Script(source.to_string()),
            Duration::from_millis(msec),
            iterations,
        );
        tracing::debug!("setInterval({}ms x{}) -> {}", msec, iterations, id);
        f64::from(id)
    }

    pub fn clear_timer(&mut self, id: TimerId) -> f64 {
        if self.forbidden_in_unload("clearTimer") {
            return f64::NAN;
        }
        self.document.timers.clear(id);
        1.0
    }

    pub fn pause_timer(&mut self, id: TimerId) -> f64 {
        if self.forbidden_in_unload("pauseTimer") || !self.document.timers.pause(id) {
            return f64::NAN;
        }
        1.0
    }

    pub fn resume_timer(&mut self, id: TimerId) -> f64 {
        if self.forbidden_in_unload("resumeTimer") || !self.document.timers.resume(id) {
            return f64::NAN;
        }
        1.0
    }

    // === Persistent storage ===

    pub fn read_persistent_array(&self, name: &str, structure: &str) -> Option<Vec<PersistentValue>> {
        let schema = ArraySchema::parse(structure)
            .inspect_err(|e| tracing::warn!("readPersistentArray({}): {}", name, e))
            .ok()?;
        let stored = match self.store.load(name) {
            Ok(stored) => stored?,
            Err(e) => {
                tracing::warn!("readPersistentArray({}): {}", name, e);
                return None;
            }
        };
        if stored.is_expired(unix_now()) {
            tracing::debug!("Persistent array {} expired", name);
            return None;
        }
        if stored.structure != schema.as_str() {
            tracing::warn!("readPersistentArray({}): stored as {}, read as {}", name, stored.structure, structure);
            return None;
        }
        schema.check(&stored.values).ok()
    }

    /// Write an array; `expires_at` is in Unix seconds
    pub fn write_persistent_array(
        &mut self,
        name: &str,
        structure: &str,
        values: &[PersistentValue],
        expires_at: Option<u64>,
    ) -> f64 {
        let checked = ArraySchema::parse(structure).and_then(|schema| {
            let values = schema.check(values)?;
            Ok((schema, values))
        });
        let (schema, values) = match checked {
            Ok(checked) => checked,
            Err(e) => {
                tracing::warn!("writePersistentArray({}): {}", name, e);
                return f64::NAN;
            }
        };
        let array = StoredArray {
            structure: schema.as_str().to_string(),
            values,
            expires_at,
        };
        match self.store.save(name, array) {
            Ok(()) => 1.0,
            Err(e) => {
                tracing::warn!("writePersistentArray({}): {}", name, e);
                f64::NAN
            }
        }
    }
}
