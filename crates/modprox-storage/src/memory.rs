//! In-process backend for tests and ephemeral deployments.
//!
//! All state sits behind one `RwLock`. Uploads arrive fully buffered, so the
//! write lock is held only for an existence check and a map insert; readers
//! never wait behind a slow upload.

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::coordinate::Coordinate;
use crate::error::{Result, StorageError};
use crate::info::VersionInfo;
use crate::store::{Archive, NewVersion, VersionSink, VersionStore};
use crate::version::Version;

#[derive(Debug)]
struct Stored {
    info: VersionInfo,
    manifest: Vec<u8>,
    archive: SharedBytes,
}

/// An archive buffer shared between the map and open readers.
#[derive(Debug, Clone)]
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

type Versions = BTreeMap<Version, Arc<Stored>>;

/// A backend holding every version in memory for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    modules: RwLock<HashMap<Coordinate, Versions>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of committed versions across all coordinates.
    pub fn len(&self) -> usize {
        self.modules.read().values().map(BTreeMap::len).sum()
    }

    /// Whether nothing has been committed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, coordinate: &Coordinate, version: &Version) -> Result<Arc<Stored>> {
        let modules = self.modules.read();
        let versions = modules
            .get(coordinate)
            .ok_or_else(|| StorageError::version_not_found(coordinate, version))?;
        versions
            .get(version)
            .cloned()
            .ok_or_else(|| StorageError::version_not_found(coordinate, version))
    }
}

impl VersionStore for MemoryStore {
    fn list_versions(&self, coordinate: &Coordinate) -> Result<Vec<Version>> {
        let modules = self.modules.read();
        match modules.get(coordinate) {
            Some(versions) if !versions.is_empty() => Ok(versions.keys().cloned().collect()),
            _ => Err(StorageError::module_not_found(coordinate)),
        }
    }

    fn info(&self, coordinate: &Coordinate, version: &Version) -> Result<VersionInfo> {
        Ok(self.get(coordinate, version)?.info.clone())
    }

    fn manifest(&self, coordinate: &Coordinate, version: &Version) -> Result<Vec<u8>> {
        Ok(self.get(coordinate, version)?.manifest.clone())
    }

    fn archive(&self, coordinate: &Coordinate, version: &Version) -> Result<Archive> {
        let stored = self.get(coordinate, version)?;
        let bytes = stored.archive.clone();
        Ok(Archive::new(bytes.0.len() as u64, Cursor::new(bytes)))
    }
}

impl VersionSink for MemoryStore {
    fn put_version(
        &self,
        coordinate: &Coordinate,
        version: &Version,
        artifacts: NewVersion,
    ) -> Result<()> {
        artifacts.validate(version)?;
        let stored = Arc::new(Stored {
            info: artifacts.info,
            manifest: artifacts.manifest,
            // Moved, not copied.
            archive: SharedBytes(Arc::new(artifacts.archive)),
        });

        let mut modules = self.modules.write();
        let versions = modules.entry(coordinate.clone()).or_default();
        if versions.contains_key(version) {
            return Err(StorageError::AlreadyExists {
                coordinate: coordinate.to_string(),
                version: version.to_string(),
            });
        }
        versions.insert(version.clone(), stored);
        drop(modules);

        debug!(%coordinate, %version, "committed version to memory store");
        Ok(())
    }
}
