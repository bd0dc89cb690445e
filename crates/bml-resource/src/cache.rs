//! Module Cache
//!
//! Holds downloaded module contents with entry and byte limits.

use crate::path::ModuleKey;
use std::collections::{BTreeMap, HashMap};

/// Contents of one downloaded module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedModule {
    /// Module version from the download announcement
    pub version: u8,
    /// Resources keyed by filename
    pub resources: BTreeMap<String, Vec<u8>>,
}

impl CachedModule {
    pub fn new(version: u8) -> Self {
        Self {
            version,
            resources: BTreeMap::new(),
        }
    }

    pub fn with_resource(mut self, name: &str, data: impl Into<Vec<u8>>) -> Self {
        self.resources.insert(name.to_string(), data.into());
        self
    }

    /// Look up a resource. Without a filename only single-resource
    /// modules resolve.
    pub fn resource(&self, filename: Option<&str>) -> Option<&[u8]> {
        match filename {
            Some(name) => self.resources.get(name).map(Vec::as_slice),
            None if self.resources.len() == 1 => {
                self.resources.values().next().map(Vec::as_slice)
            }
            None => None,
        }
    }

    /// Total size of all resources
    pub fn size(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }
}

#[derive(Debug)]
struct CacheEntry {
    module: CachedModule,
    last_accessed: u64,
}

/// Module cache
#[derive(Debug)]
pub struct ModuleCache {
    entries: HashMap<ModuleKey, CacheEntry>,
    max_entries: usize,
    max_size_bytes: usize,
    current_size: usize,
    clock: u64,
}

impl ModuleCache {
    /// Create a new cache with limits
    pub fn new(max_entries: usize, max_size_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            max_size_bytes,
            current_size: 0,
            clock: 0,
        }
    }

    fn touch(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub fn contains(&self, key: ModuleKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Get a cached module, updating its access time
    pub fn get(&mut self, key: ModuleKey) -> Option<&CachedModule> {
        let now = self.touch();
        let entry = self.entries.get_mut(&key)?;
        entry.last_accessed = now;
        Some(&entry.module)
    }

    /// Get without touching access time
    pub fn peek(&self, key: ModuleKey) -> Option<&CachedModule> {
        self.entries.get(&key).map(|e| &e.module)
    }

    /// Store a module. Entries for which `pinned` returns true are never
    /// evicted; returns false if the module could not be made to fit.
    pub fn put(
        &mut self,
        key: ModuleKey,
        module: CachedModule,
        pinned: impl Fn(ModuleKey) -> bool,
    ) -> bool {
        let size = module.size();
        if size > self.max_size_bytes {
            tracing::warn!("Module {} ({} bytes) exceeds cache size", key, size);
            return false;
        }

        // An existing entry for `key` is replaced only once the new one fits
        let (old_entries, old_size) = match self.entries.get(&key) {
            Some(entry) => (1, entry.module.size()),
            None => (0, 0),
        };
        while self.entries.len() - old_entries >= self.max_entries
            || self.current_size - old_size + size > self.max_size_bytes
        {
            if !self.evict_one(key, &pinned) {
                tracing::warn!("Cache full of locked modules, dropping {}", key);
                return false;
            }
        }

        self.remove(key);
        let now = self.touch();
        self.entries.insert(key, CacheEntry { module, last_accessed: now });
        self.current_size += size;
        true
    }

    /// Remove an entry
    pub fn remove(&mut self, key: ModuleKey) -> Option<CachedModule> {
        let entry = self.entries.remove(&key)?;
        self.current_size = self.current_size.saturating_sub(entry.module.size());
        Some(entry.module)
    }

    /// Evict the least recently accessed unpinned entry other than `keep`
    fn evict_one(&mut self, keep: ModuleKey, pinned: &impl Fn(ModuleKey) -> bool) -> bool {
        let oldest = self
            .entries
            .iter()
            .filter(|(k, _)| **k != keep && !pinned(**k))
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| *k);

        match oldest {
            Some(key) => {
                tracing::debug!("Evicting module {}", key);
                self.remove(key);
                true
            }
            None => false,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = ModuleKey> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.current_size
    }
}
