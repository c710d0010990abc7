//! In-memory archive store backed by a concurrent map

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{Archive, ArchiveKey, ArchiveStore};

/// Default archive name suffix
pub const DEFAULT_SUFFIX: &str = ".nc";

/// Archive cache living as long as the store
#[derive(Debug)]
pub struct InMemoryArchiveStore {
    archives: DashMap<ArchiveKey, Arc<Archive>>,
    suffix: String,
}

impl InMemoryArchiveStore {
    pub fn new() -> Self {
        Self::with_suffix(DEFAULT_SUFFIX)
    }

    /// Store whose archive names end in `suffix` (e.g. `".nc"`, or `""`)
    pub fn with_suffix(suffix: impl Into<String>) -> Self {
        Self {
            archives: DashMap::new(),
            suffix: suffix.into(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl Default for InMemoryArchiveStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveStore for InMemoryArchiveStore {
    fn get_or_create(&self, key: ArchiveKey) -> Arc<Archive> {
        match self.archives.entry(key) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let name = entry.key().canonical_name(&self.suffix);
                let archive = Arc::new(Archive::new(entry.key().clone(), name));
                debug!("created {}", archive);
                entry.insert(Arc::clone(&archive));
                archive
            }
        }
    }

    fn get(&self, key: &ArchiveKey) -> Option<Arc<Archive>> {
        self.archives.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn archives(&self) -> Vec<Arc<Archive>> {
        let mut archives: Vec<_> = self
            .archives
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        archives.sort_by(|a, b| a.name().cmp(b.name()));
        archives
    }

    fn len(&self) -> usize {
        self.archives.len()
    }
}
