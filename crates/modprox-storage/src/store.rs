//! Read and write capabilities every backend implements.
//!
//! [`VersionStore`] is purely observational; [`VersionSink`] is the only
//! way shared state changes. Both are object safe so the protocol layer can
//! hold `Arc<dyn VersionStore>` and `Arc<dyn VersionSink>` chosen at startup.

use std::fmt;
use std::io::Read;

use crate::coordinate::Coordinate;
use crate::error::{ErrorKind, Result, StorageError};
use crate::info::VersionInfo;
use crate::version::Version;

/// A readable handle on a committed archive.
///
/// Archives can be hundreds of megabytes, so backends hand out a reader
/// instead of a buffer.
pub struct Archive {
    /// Exact length in bytes.
    pub len: u64,
    /// The archive contents.
    pub reader: Box<dyn Read + Send>,
}

impl Archive {
    /// Wrap a reader of known length.
    pub fn new(len: u64, reader: impl Read + Send + 'static) -> Self {
        Archive {
            len,
            reader: Box::new(reader),
        }
    }

    /// Drain the archive into memory.
    pub fn into_bytes(mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len as usize);
        self.reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive").field("len", &self.len).finish()
    }
}

/// Everything committed for one version.
#[derive(Debug, Clone)]
pub struct NewVersion {
    /// Metadata record.
    pub info: VersionInfo,
    /// Module manifest, stored verbatim.
    pub manifest: Vec<u8>,
    /// Module archive, stored verbatim.
    pub archive: Vec<u8>,
}

impl NewVersion {
    /// Check the payload belongs to `version` and has every part.
    pub fn validate(&self, version: &Version) -> Result<()> {
        if self.info.version != version.as_str() {
            return Err(StorageError::invalid(format!(
                "info is for {} but version is {version}",
                self.info.version
            )));
        }
        if self.manifest.is_empty() {
            return Err(StorageError::invalid("manifest is empty"));
        }
        if self.archive.is_empty() {
            return Err(StorageError::invalid("archive is empty"));
        }
        Ok(())
    }
}

/// Read capability.
///
/// Implementations must be safe to call concurrently with each other and
/// with [`VersionSink::put_version`], and must never expose a version whose
/// artifacts are not all readable.
pub trait VersionStore: Send + Sync {
    /// All versions of `coordinate`, ascending by precedence.
    ///
    /// Fails with `NotFound` when nothing was ever published under it.
    fn list_versions(&self, coordinate: &Coordinate) -> Result<Vec<Version>>;

    /// Metadata of one version.
    fn info(&self, coordinate: &Coordinate, version: &Version) -> Result<VersionInfo>;

    /// Manifest bytes of one version.
    fn manifest(&self, coordinate: &Coordinate, version: &Version) -> Result<Vec<u8>>;

    /// Archive of one version.
    fn archive(&self, coordinate: &Coordinate, version: &Version) -> Result<Archive>;

    /// Check if a specific version exists.
    fn exists(&self, coordinate: &Coordinate, version: &Version) -> Result<bool> {
        match self.info(coordinate, version) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Write capability.
pub trait VersionSink: Send + Sync {
    /// Commit a new version.
    ///
    /// Fails with `AlreadyExists` if the version was committed before (the
    /// existing artifacts are left untouched) and with `Invalid` if the
    /// payload does not validate. On success all three artifacts become
    /// visible to readers together.
    fn put_version(
        &self,
        coordinate: &Coordinate,
        version: &Version,
        artifacts: NewVersion,
    ) -> Result<()>;
}

/// A type offering both capabilities.
pub trait Backend: VersionStore + VersionSink {}

impl<T: VersionStore + VersionSink + ?Sized> Backend for T {}
