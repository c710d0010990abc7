//! Domain layer for impactlab archives
//!
//! # Domain Models
//!
//! - `Archive`: one versioned value for a fully-resolved index combination
//! - `ArchiveKey`: `(variable name, indices)` identity of an archive
//! - `Version` / `BumpLevel`: monotonic version tokens
//!
//! # Port Trait
//!
//! - `ArchiveStore`: memoizing archive cache the registry resolves through

mod archive;
mod version;

use std::sync::Arc;

pub use archive::{Archive, ArchiveKey, ArchiveReader, Indices, Payload};
pub use version::{BumpLevel, Version};

/// Archive store abstraction
///
/// Implementations guarantee that each distinct [`ArchiveKey`] maps to exactly
/// one [`Archive`] for the lifetime of the store.
pub trait ArchiveStore: Send + Sync {
    /// Return the archive for `key`, creating it on first use
    fn get_or_create(&self, key: ArchiveKey) -> Arc<Archive>;

    /// Return the archive for `key` if it has been created
    fn get(&self, key: &ArchiveKey) -> Option<Arc<Archive>>;

    /// All archives created so far, ordered by name
    fn archives(&self) -> Vec<Arc<Archive>>;

    /// Number of archives created so far
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
