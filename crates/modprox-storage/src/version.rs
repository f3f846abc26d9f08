//! Module versions.
//!
//! Wraps the `semver` crate. Versions carry a leading `v` on the wire
//! (`v1.2.3`, `v0.0.0-20180101000000-abcdef123456`) and are ordered by
//! semantic-version precedence.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StorageError};

/// A parsed module version.
///
/// Keeps the raw string so that it is echoed back byte-for-byte, alongside
/// the parsed form used for ordering.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    semver: semver::Version,
}

impl Version {
    /// Parse a version string like `v1.2.3`.
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s.strip_prefix('v').ok_or_else(|| {
            StorageError::invalid(format!("version '{s}' must start with 'v'"))
        })?;
        let semver = semver::Version::parse(rest)
            .map_err(|e| StorageError::invalid(format!("version '{s}': {e}")))?;
        Ok(Version {
            raw: s.to_string(),
            semver,
        })
    }

    /// The version exactly as published.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The parsed semantic version (without the `v`).
    pub fn semver(&self) -> &semver::Version {
        &self.semver
    }

    /// Whether this is a prerelease (including pseudo-versions).
    pub fn is_prerelease(&self) -> bool {
        !self.semver.pre.is_empty()
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.semver
            .cmp(&other.semver)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Version {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

/// Pick the version a client asking for "latest" should get.
///
/// Returns the highest release version, or the highest prerelease when no
/// release exists.
pub fn latest(available: &[Version]) -> Option<&Version> {
    available
        .iter()
        .filter(|v| !v.is_prerelease())
        .max()
        .or_else(|| available.iter().max())
}
