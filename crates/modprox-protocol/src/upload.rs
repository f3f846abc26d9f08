//! Upload payload assembly.
//!
//! An upload carries three named parts: `info`, `mod` and `zip` (`manifest`
//! and `archive` are accepted as aliases). Parts are size-checked as they
//! arrive so that an oversized upload is refused before it is buffered.

use serde::{Deserialize, Serialize};

use modprox_storage::{NewVersion, StorageError, Version, VersionInfo};

use crate::error::{ProtocolError, Result};

/// Per-part upload size limits, in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum size of the info document.
    pub max_info_bytes: u64,
    /// Maximum size of the module manifest.
    pub max_manifest_bytes: u64,
    /// Maximum size of the module archive.
    pub max_archive_bytes: u64,
}

/// Allowance for multipart boundaries and part headers.
const MULTIPART_OVERHEAD: u64 = 1 << 20;

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_info_bytes: 64 << 10,
            max_manifest_bytes: 16 << 20,
            max_archive_bytes: 500 << 20,
        }
    }
}

impl Limits {
    /// Largest request body a complete upload can need.
    pub fn max_body_bytes(&self) -> u64 {
        self.max_info_bytes
            .saturating_add(self.max_manifest_bytes)
            .saturating_add(self.max_archive_bytes)
            .saturating_add(MULTIPART_OVERHEAD)
    }

    /// The limit applying to `part`.
    pub fn limit_for(&self, part: Part) -> u64 {
        match part {
            Part::Info => self.max_info_bytes,
            Part::Manifest => self.max_manifest_bytes,
            Part::Archive => self.max_archive_bytes,
        }
    }
}

/// One of the three upload parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    Info,
    Manifest,
    Archive,
}

impl Part {
    /// Resolve a multipart field name.
    pub fn from_name(name: &str) -> Result<Part> {
        match name {
            "info" => Ok(Part::Info),
            "mod" | "manifest" => Ok(Part::Manifest),
            "zip" | "archive" => Ok(Part::Archive),
            other => Err(StorageError::invalid(format!("unknown upload part '{other}'")).into()),
        }
    }

    /// Canonical part name.
    pub fn name(self) -> &'static str {
        match self {
            Part::Info => "info",
            Part::Manifest => "mod",
            Part::Archive => "zip",
        }
    }
}

/// Parts collected from one upload request.
#[derive(Debug, Clone)]
pub struct UploadForm {
    limits: Limits,
    info: Option<Vec<u8>>,
    manifest: Option<Vec<u8>>,
    archive: Option<Vec<u8>>,
}

impl UploadForm {
    /// Start an empty form governed by `limits`.
    pub fn new(limits: Limits) -> Self {
        UploadForm {
            limits,
            info: None,
            manifest: None,
            archive: None,
        }
    }

    /// The limit for `part` under this form's limits.
    pub fn limit_for(&self, part: Part) -> u64 {
        self.limits.limit_for(part)
    }

    /// Fail with `PayloadTooLarge` if `len` bytes of `part` exceed the limit.
    ///
    /// Streaming readers call this as chunks arrive.
    pub fn check_size(&self, part: Part, len: u64) -> Result<()> {
        let limit = self.limit_for(part);
        if len > limit {
            return Err(ProtocolError::PayloadTooLarge {
                part: part.name().to_string(),
                limit,
            });
        }
        Ok(())
    }

    /// Record one part. Each part may appear once.
    pub fn add_part(&mut self, part: Part, data: Vec<u8>) -> Result<()> {
        self.check_size(part, data.len() as u64)?;
        let slot = match part {
            Part::Info => &mut self.info,
            Part::Manifest => &mut self.manifest,
            Part::Archive => &mut self.archive,
        };
        if slot.is_some() {
            return Err(StorageError::invalid(format!(
                "upload part '{}' given more than once",
                part.name()
            ))
            .into());
        }
        *slot = Some(data);
        Ok(())
    }

    /// Record one part by field name.
    pub fn add_named(&mut self, name: &str, data: Vec<u8>) -> Result<()> {
        let part = Part::from_name(name)?;
        self.add_part(part, data)
    }

    /// Turn the collected parts into a payload for `version`.
    pub fn into_new_version(self, version: &Version) -> Result<NewVersion> {
        let missing = |part: Part| -> ProtocolError {
            StorageError::invalid(format!("upload is missing the '{}' part", part.name())).into()
        };
        let info = self.info.ok_or_else(|| missing(Part::Info))?;
        let manifest = self.manifest.ok_or_else(|| missing(Part::Manifest))?;
        let archive = self.archive.ok_or_else(|| missing(Part::Archive))?;

        Ok(NewVersion {
            info: VersionInfo::from_upload(&info, version)?,
            manifest,
            archive,
        })
    }
}
