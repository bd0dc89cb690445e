//! Module Registry
//!
//! Program map, download announcement, cache and lock state for broadcast
//! modules. Every access to module bytes goes through [`ModuleRegistry::fetch_locked`].

use crate::cache::{CachedModule, ModuleCache};
use crate::path::{ComponentId, ModuleId, ModuleKey, ResourcePath};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Kind of lock held on a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    /// `lockModuleOnMemory`
    Plain,
    /// `lockModuleOnMemoryEx`
    Extended,
}

impl LockKind {
    pub fn is_extended(self) -> bool {
        matches!(self, LockKind::Extended)
    }
}

/// Why a lock request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("Component {0} is not in the program map")]
    ComponentAbsent(ComponentId),

    #[error("Module {0} is not in the download announcement")]
    ModuleNotAnnounced(ModuleKey),
}

/// Result of a lock request that was not refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Module was cached and is now locked
    Locked,
    /// Module was already locked; nothing changed
    AlreadyLocked,
    /// Module is not cached yet; a fetch is outstanding
    Pending,
}

/// Who is waiting on a module fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Waiter {
    /// A document launch to retry with the original target
    Document { target: String },
    /// A script lock request, notified on completion
    Lock { reference: String, kind: LockKind },
}

/// A module fetch for the network layer to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub key: ModuleKey,
}

/// Module fetch error reported by the network layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Module {0} not found")]
    NotFound(ModuleKey),

    #[error("Fetch failed: {0}")]
    Network(String),
}

/// Process-wide module registry
#[derive(Debug)]
pub struct ModuleRegistry {
    program_map: HashSet<ComponentId>,
    download_info: HashMap<ComponentId, HashMap<ModuleId, u8>>,
    cache: ModuleCache,
    locks: BTreeMap<ModuleKey, LockKind>,
    /// Modules held by the browser itself; never visible to scripts
    pins: BTreeSet<ModuleKey>,
    waiters: HashMap<ModuleKey, Vec<Waiter>>,
    /// Modules with a fetch request already issued
    requested: HashSet<ModuleKey>,
    requests: Vec<FetchRequest>,
}

impl ModuleRegistry {
    /// Create a registry with cache limits
    pub fn new(max_cached_modules: usize, max_cache_bytes: usize) -> Self {
        Self {
            program_map: HashSet::new(),
            download_info: HashMap::new(),
            cache: ModuleCache::new(max_cached_modules, max_cache_bytes),
            locks: BTreeMap::new(),
            pins: BTreeSet::new(),
            waiters: HashMap::new(),
            requested: HashSet::new(),
            requests: Vec::new(),
        }
    }

    // === Broadcast state ===

    /// Replace the set of components in the current program map
    pub fn set_program_map(&mut self, components: impl IntoIterator<Item = ComponentId>) {
        self.program_map = components.into_iter().collect();
        tracing::debug!("Program map: {} components", self.program_map.len());
    }

    /// Replace the download announcement of one component.
    ///
    /// Unlocked cached modules that disappeared or changed version are dropped.
    /// Waiters on modules that are announced only now get their fetch issued.
    pub fn update_download_info(
        &mut self,
        component: ComponentId,
        modules: impl IntoIterator<Item = (ModuleId, u8)>,
    ) {
        let modules: HashMap<ModuleId, u8> = modules.into_iter().collect();

        let stale: Vec<ModuleKey> = self
            .cache
            .keys()
            .filter(|k| k.component == component && !self.is_held(*k))
            .filter(|k| {
                let cached = self.cache.peek(*k).map(|m| m.version);
                modules.get(&k.module).copied() != cached
            })
            .collect();
        for key in stale {
            tracing::debug!("Dropping stale module {}", key);
            self.cache.remove(key);
        }

        self.download_info.insert(component, modules);

        let waiting: Vec<ModuleKey> = self
            .waiters
            .keys()
            .filter(|k| k.component == component)
            .copied()
            .collect();
        for key in waiting {
            self.issue_request(key);
        }
    }

    pub fn component_present(&self, component: ComponentId) -> bool {
        self.program_map.contains(&component)
    }

    pub fn module_announced(&self, key: ModuleKey) -> bool {
        self.announced_version(key).is_some()
    }

    pub fn announced_version(&self, key: ModuleKey) -> Option<u8> {
        self.download_info
            .get(&key.component)
            .and_then(|m| m.get(&key.module))
            .copied()
    }

    // === Cache ===

    pub fn is_cached(&self, key: ModuleKey) -> bool {
        self.cache.contains(key)
    }

    /// Store module contents directly
    pub fn insert(&mut self, key: ModuleKey, module: CachedModule) -> bool {
        let (locks, pins) = (&self.locks, &self.pins);
        self.cache.put(key, module, |k| locks.contains_key(&k) || pins.contains(&k))
    }

    /// Read a resource from a locked or pinned module
    pub fn fetch_locked(&mut self, path: &ResourcePath) -> Option<&[u8]> {
        if !self.is_held(path.key) {
            tracing::debug!("fetch_locked: {} is not locked", path);
            return None;
        }
        self.cache.get(path.key)?.resource(path.filename.as_deref())
    }

    // === Pins ===

    /// Hold a cached module for the browser without taking a script lock
    pub fn pin(&mut self, key: ModuleKey) -> bool {
        if !self.cache.contains(key) {
            return false;
        }
        if self.pins.insert(key) {
            tracing::debug!("Pinned {}", key);
        }
        true
    }

    pub fn unpin(&mut self, key: ModuleKey) -> bool {
        let removed = self.pins.remove(&key);
        if removed {
            tracing::debug!("Unpinned {}", key);
        }
        removed
    }

    pub fn unpin_all(&mut self) {
        self.pins.clear();
    }

    pub fn is_pinned(&self, key: ModuleKey) -> bool {
        self.pins.contains(&key)
    }

    /// Locked or pinned
    fn is_held(&self, key: ModuleKey) -> bool {
        self.locks.contains_key(&key) || self.pins.contains(&key)
    }

    // === Locks ===

    pub fn is_locked(&self, key: ModuleKey) -> bool {
        self.locks.contains_key(&key)
    }

    pub fn lock_kind(&self, key: ModuleKey) -> Option<LockKind> {
        self.locks.get(&key).copied()
    }

    /// Lock a module if it is cached. An extended lock always takes the
    /// extended state; a plain lock never downgrades an existing lock.
    pub fn lock_cached(&mut self, key: ModuleKey, kind: LockKind) -> bool {
        if !self.cache.contains(key) {
            return false;
        }
        match kind {
            LockKind::Extended => {
                self.locks.insert(key, LockKind::Extended);
            }
            LockKind::Plain => {
                self.locks.entry(key).or_insert(LockKind::Plain);
            }
        }
        tracing::debug!("Locked {} ({:?})", key, kind);
        true
    }

    /// Full lock request: program map, announcement and cache checks.
    /// Uncached modules get a fetch queued with `waiter`.
    pub fn lock(&mut self, key: ModuleKey, kind: LockKind, waiter: Waiter) -> Result<LockOutcome, LockError> {
        if kind == LockKind::Plain && self.is_locked(key) {
            return Ok(LockOutcome::AlreadyLocked);
        }
        if !self.component_present(key.component) {
            return Err(LockError::ComponentAbsent(key.component));
        }
        if !self.module_announced(key) {
            return Err(LockError::ModuleNotAnnounced(key));
        }
        if self.lock_cached(key, kind) {
            return Ok(LockOutcome::Locked);
        }
        self.request_fetch(key, waiter);
        Ok(LockOutcome::Pending)
    }

    /// Release a lock taken with the same kind
    pub fn unlock(&mut self, key: ModuleKey, kind: LockKind) -> bool {
        match self.locks.get(&key) {
            Some(held) if *held == kind => {
                self.locks.remove(&key);
                tracing::debug!("Unlocked {} ({:?})", key, kind);
                true
            }
            Some(held) => {
                tracing::debug!("Unlock {} as {:?} but held as {:?}", key, kind, held);
                false
            }
            None => false,
        }
    }

    pub fn unlock_all(&mut self) {
        if !self.locks.is_empty() {
            tracing::debug!("Unlocking {} modules", self.locks.len());
        }
        self.locks.clear();
    }

    /// Locked modules in key order
    pub fn locked_modules(&self) -> Vec<(ModuleKey, LockKind)> {
        self.locks.iter().map(|(k, v)| (*k, *v)).collect()
    }

    // === Fetching ===

    /// Register a waiter once. A fetch request is issued once per module,
    /// as soon as the module is announced; returns true if it was issued now.
    pub fn request_fetch(&mut self, key: ModuleKey, waiter: Waiter) -> bool {
        let waiters = self.waiters.entry(key).or_default();
        if !waiters.contains(&waiter) {
            waiters.push(waiter);
        }
        self.issue_request(key)
    }

    fn issue_request(&mut self, key: ModuleKey) -> bool {
        if !self.module_announced(key) {
            tracing::debug!("Module {} not announced yet, waiting", key);
            return false;
        }
        if !self.requested.insert(key) {
            return false;
        }
        tracing::debug!("Requesting module {}", key);
        self.requests.push(FetchRequest { key });
        true
    }

    pub fn fetch_pending(&self, key: ModuleKey) -> bool {
        self.waiters.contains_key(&key)
    }

    /// Drain outstanding fetch requests for the network layer
    pub fn take_fetch_requests(&mut self) -> Vec<FetchRequest> {
        std::mem::take(&mut self.requests)
    }

    /// Store a completed fetch and hand back everyone waiting on it
    pub fn complete_fetch(&mut self, key: ModuleKey, result: Result<CachedModule, FetchError>) -> Vec<Waiter> {
        match result {
            Ok(module) => {
                self.insert(key, module);
            }
            Err(e) => tracing::warn!("Fetch of {} failed: {}", key, e),
        }
        self.requested.remove(&key);
        self.waiters.remove(&key).unwrap_or_default()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new(64, 16 * 1024 * 1024)
    }
}
