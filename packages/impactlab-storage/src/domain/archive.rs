//! Versioned single-value archives

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::Arc;
use tracing::{debug, info};

use super::version::{BumpLevel, Version};
use crate::Result;

/// Concrete index assignment: dimension name -> value.
///
/// Sorted by dimension name, which makes it its own canonical form.
pub type Indices = BTreeMap<String, String>;

/// Data held by an archive
pub type Payload = serde_json::Value;

/// Identity of one archive: a variable name plus fully-resolved indices
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchiveKey {
    pub variable: String,
    pub indices: Indices,
}

impl ArchiveKey {
    pub fn new(variable: impl Into<String>, indices: Indices) -> Self {
        Self {
            variable: variable.into(),
            indices,
        }
    }

    /// Storage name: the variable path, then index values ordered by
    /// dimension name, then `suffix`.
    ///
    /// ```rust
    /// use impactlab_storage::domain::{ArchiveKey, Indices};
    ///
    /// let mut indices = Indices::new();
    /// indices.insert("ssp".into(), "ssp3".into());
    /// indices.insert("rcp".into(), "rcp85".into());
    ///
    /// let key = ArchiveKey::new("/GCP/impacts/mortality", indices);
    /// assert_eq!(key.canonical_name(".nc"), "/GCP/impacts/mortality/rcp85/ssp3.nc");
    /// ```
    pub fn canonical_name(&self, suffix: &str) -> String {
        let mut name = self.variable.clone();
        for value in self.indices.values() {
            name.push('/');
            name.push_str(value);
        }
        name.push_str(suffix);
        name
    }
}

#[derive(Debug)]
struct ArchiveState {
    version: Version,
    value: Arc<Payload>,
    updated_at: Option<DateTime<Utc>>,
}

/// The versioned storage unit for one index combination of a variable.
///
/// Archives are shared (`Arc<Archive>`) between the store and every step that
/// resolves them. All mutation goes through [`Archive::update`]; the state
/// lock makes each bump atomic.
#[derive(Debug)]
pub struct Archive {
    key: ArchiveKey,
    name: String,
    state: RwLock<ArchiveState>,
}

impl Archive {
    pub fn new(key: ArchiveKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            state: RwLock::new(ArchiveState {
                version: Version::INITIAL,
                value: Arc::new(Payload::Null),
                updated_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &ArchiveKey {
        &self.key
    }

    /// Name of the variable this archive belongs to
    pub fn variable(&self) -> &str {
        &self.key.variable
    }

    pub fn indices(&self) -> &Indices {
        &self.key.indices
    }

    pub fn version(&self) -> Version {
        self.state.read().version
    }

    /// Snapshot of the current value
    pub fn value(&self) -> Arc<Payload> {
        Arc::clone(&self.state.read().value)
    }

    /// When the archive was last updated; `None` until the first update
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().updated_at
    }

    /// Replace the value and bump the version one patch level.
    ///
    /// The version advances even if `value` equals the current value.
    /// Returns the new version.
    pub fn update(&self, value: Payload) -> Version {
        let (old, new) = {
            let mut state = self.state.write();
            let old = state.version;
            state.version = old.bump(BumpLevel::Patch);
            state.value = Arc::new(value);
            state.updated_at = Some(Utc::now());
            (old, state.version)
        };

        info!("{} bumped {} --> {}", self, old, new);
        new
    }

    /// Open a readable stream over the serialized current value.
    ///
    /// The reader owns a snapshot taken at open time, so later updates never
    /// change bytes underneath it. Dropping the reader releases it.
    pub fn open(&self) -> Result<ArchiveReader> {
        let (version, value) = {
            let state = self.state.read();
            (state.version, Arc::clone(&state.value))
        };

        debug!("loading {}", self);
        let bytes = serde_json::to_vec(value.as_ref())?;
        Ok(ArchiveReader {
            version,
            cursor: Cursor::new(bytes),
        })
    }

    /// Deserialize the current value into `T`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.value();
        Ok(serde_json::from_value(Payload::clone(&value))?)
    }
}

impl fmt::Display for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Archive {}>", self.name)
    }
}

/// Scoped read stream returned by [`Archive::open`]
#[derive(Debug)]
pub struct ArchiveReader {
    version: Version,
    cursor: Cursor<Vec<u8>>,
}

impl ArchiveReader {
    /// Version of the archive at the moment it was opened
    pub fn version(&self) -> Version {
        self.version
    }

    /// Parse the remaining stream as JSON
    pub fn read_json<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_reader(self)?)
    }
}

impl Read for ArchiveReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}
