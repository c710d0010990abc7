//! impactlab-storage: versioned archives for scenario data
//!
//! An archive holds the single current value of one variable at one
//! fully-resolved index combination (e.g. mortality at `rcp85`/`ssp3`).
//! Every update stamps a new patch-level version; readers get a snapshot
//! stream of the serialized value.
//!
//! ## Usage
//!
//! ```rust
//! use impactlab_storage::{ArchiveKey, ArchiveStore, Indices, InMemoryArchiveStore};
//! use serde_json::json;
//!
//! let store = InMemoryArchiveStore::new();
//! let mut indices = Indices::new();
//! indices.insert("rcp".into(), "rcp85".into());
//!
//! let archive = store.get_or_create(ArchiveKey::new("/climate/raw", indices));
//! archive.update(json!(5));
//! assert_eq!(archive.version().to_string(), "0.0.2");
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{
    Archive, ArchiveKey, ArchiveReader, ArchiveStore, BumpLevel, Indices, Payload, Version,
};
pub use infrastructure::InMemoryArchiveStore;
