//! Bumpable `major.minor.patch` version tokens stamped on every archive update.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StorageError;

/// Granularity of a version bump, finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpLevel {
    Patch,
    Minor,
    Major,
}

impl BumpLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BumpLevel::Patch => "patch",
            BumpLevel::Minor => "minor",
            BumpLevel::Major => "major",
        }
    }
}

impl fmt::Display for BumpLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Archive version token
///
/// Ordering is lexicographic over `(major, minor, patch)`, so every bump
/// produces a strictly greater token.
///
/// # Examples
///
/// ```rust
/// use impactlab_storage::domain::{BumpLevel, Version};
///
/// let v = Version::INITIAL.bump(BumpLevel::Patch);
/// assert_eq!(v.to_string(), "0.0.2");
/// assert!(v > Version::INITIAL);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    /// Version assigned to a freshly created archive
    pub const INITIAL: Version = Version::new(0, 0, 1);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Next version at `level`; finer levels reset to zero.
    pub fn bump(self, level: BumpLevel) -> Self {
        match level {
            BumpLevel::Patch => Self::new(self.major, self.minor, self.patch + 1),
            BumpLevel::Minor => Self::new(self.major, self.minor + 1, 0),
            BumpLevel::Major => Self::new(self.major + 1, 0, 0),
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u64, StorageError> {
            parts
                .next()
                .and_then(|p| p.parse::<u64>().ok())
                .ok_or_else(|| StorageError::invalid_version(s))
        };

        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(StorageError::invalid_version(s));
        }
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_patch() {
        let v = Version::new(1, 2, 3).bump(BumpLevel::Patch);
        assert_eq!(v, Version::new(1, 2, 4));
    }

    #[test]
    fn test_bump_resets_finer_levels() {
        assert_eq!(
            Version::new(1, 2, 3).bump(BumpLevel::Minor),
            Version::new(1, 3, 0)
        );
        assert_eq!(
            Version::new(1, 2, 3).bump(BumpLevel::Major),
            Version::new(2, 0, 0)
        );
    }

    #[test]
    fn test_every_level_increases() {
        let v = Version::new(4, 7, 9);
        for level in [BumpLevel::Patch, BumpLevel::Minor, BumpLevel::Major] {
            assert!(v.bump(level) > v, "{} bump did not increase", level);
        }
    }

    #[test]
    fn test_parse_and_display() {
        let v: Version = "0.0.1".parse().unwrap();
        assert_eq!(v, Version::INITIAL);
        assert_eq!(Version::new(10, 0, 3).to_string(), "10.0.3");
    }

    #[test]
    fn test_parse_invalid() {
        assert!("0.0".parse::<Version>().is_err());
        assert!("0.0.1.2".parse::<Version>().is_err());
        assert!("a.b.c".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }
}
