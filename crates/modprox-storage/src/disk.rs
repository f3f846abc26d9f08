//! Filesystem backend.
//!
//! Layout:
//! ```text
//! <root>/
//!   .lock                             advisory lock held by writable handles
//!   .staging/<uuid>/                  uploads in flight
//!   <base url...>/<module>/@v/<version>/
//!     version.info                    info document
//!     version.mod                     manifest
//!     version.zip                     archive
//!     integrity.json                  SHA-256 of the three files above
//! ```
//!
//! Path elements and versions are stored in escaped form (see
//! [`escape_path`]).
//!
//! A version is written into a private staging directory, every file is
//! synced, and the directory is then renamed into place. The rename is the
//! only publish step, so a version directory either does not exist or holds
//! all four files, including after a crash.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fs2::FileExt;
use tracing::{debug, info, warn};

use crate::coordinate::{escape_path, unescape_path, Coordinate};
use crate::error::{Result, StorageError};
use crate::info::VersionInfo;
use crate::integrity::{ContentHash, IntegrityRecord};
use crate::store::{Archive, NewVersion, VersionSink, VersionStore};
use crate::version::Version;

const STAGING_DIR: &str = ".staging";
const VERSIONS_DIR: &str = "@v";
const INFO_FILE: &str = "version.info";
const MOD_FILE: &str = "version.mod";
const ZIP_FILE: &str = "version.zip";
const INTEGRITY_FILE: &str = "integrity.json";
const LOCK_FILE: &str = ".lock";

const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// A durable backend rooted at a directory.
///
/// Writable handles hold a shared advisory lock on `<root>/.lock` for their
/// whole life. Leftover staging is only cleared by a handle that briefly
/// gets the lock exclusively, which means no other writer is live.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
    lock: Option<Arc<File>>,
}

impl DiskStore {
    /// Open (creating if needed) a writable store rooted at `root`.
    ///
    /// Leftover staging directories from an interrupted process are removed
    /// when no other writable handle on `root` exists; they were never
    /// visible to readers.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let staging = root.join(STAGING_DIR);
        fs::create_dir_all(&root).map_err(|e| io_error(e, "creating store root", &root))?;

        let lock_path = root.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| io_error(e, "opening store lock", &lock_path))?;

        match FileExt::try_lock_exclusive(&lock) {
            Ok(()) => {
                let cleared = clear_staging(&root, &staging);
                // Release before propagating a failed clear.
                FileExt::unlock(&lock)
                    .map_err(|e| io_error(e, "releasing store lock", &lock_path))?;
                cleared?;
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                debug!(root = %root.display(), "store in use by another handle, keeping staging");
            }
            Err(e) => return Err(io_error(e, "locking store", &lock_path)),
        }
        FileExt::lock_shared(&lock).map_err(|e| io_error(e, "locking store", &lock_path))?;
        fs::create_dir_all(&staging)
            .map_err(|e| io_error(e, "creating staging directory", &staging))?;

        info!(root = %root.display(), "opened disk store");
        Ok(DiskStore {
            root,
            lock: Some(Arc::new(lock)),
        })
    }

    /// Open an existing store for reading only.
    ///
    /// Touches nothing on disk, so it is safe against a store another
    /// process is serving. [`VersionSink::put_version`] on such a handle
    /// fails.
    pub fn open_read_only(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StorageError::unavailable(
                format!("opening disk store at {}", root.display()),
                io::Error::new(io::ErrorKind::NotFound, "store root does not exist"),
            ));
        }
        Ok(DiskStore { root, lock: None })
    }

    /// Get the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether this handle may publish versions.
    pub fn is_writable(&self) -> bool {
        self.lock.is_some()
    }

    fn module_dir(&self, coordinate: &Coordinate) -> PathBuf {
        let mut dir = self.root.clone();
        for elem in coordinate.escaped_elements() {
            dir.push(elem);
        }
        dir.push(VERSIONS_DIR);
        dir
    }

    fn version_dir(&self, coordinate: &Coordinate, version: &Version) -> PathBuf {
        self.module_dir(coordinate)
            .join(escape_path(version.as_str()))
    }

    fn read_artifact(
        &self,
        coordinate: &Coordinate,
        version: &Version,
        file: &str,
    ) -> Result<Vec<u8>> {
        let path = self.version_dir(coordinate, version).join(file);
        with_retry(&path, || fs::read(&path))
            .map_err(|e| read_error(e, coordinate, version, &path))
    }

    /// Recompute the hashes of a committed version and compare them with
    /// its integrity record.
    ///
    /// Returns `Ok(false)` on any mismatch or a missing record.
    pub fn verify(&self, coordinate: &Coordinate, version: &Version) -> Result<bool> {
        let dir = self.version_dir(coordinate, version);
        if !dir.is_dir() {
            return Err(StorageError::version_not_found(coordinate, version));
        }

        let record_path = dir.join(INTEGRITY_FILE);
        let record: IntegrityRecord = match fs::read(&record_path) {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|e| StorageError::unavailable("decoding integrity record", e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(io_error(e, "reading integrity record", &record_path)),
        };

        let info = self.read_artifact(coordinate, version, INFO_FILE)?;
        let manifest = self.read_artifact(coordinate, version, MOD_FILE)?;
        let zip_path = dir.join(ZIP_FILE);
        let archive_hash = File::open(&zip_path)
            .and_then(|mut f| ContentHash::compute_reader(&mut f))
            .map_err(|e| read_error(e, coordinate, version, &zip_path))?;

        Ok(record.info.verify(&info)
            && record.manifest.verify(&manifest)
            && record.archive == archive_hash)
    }

    /// Every coordinate with at least one committed version, sorted.
    pub fn coordinates(&self) -> Result<Vec<Coordinate>> {
        let mut found = Vec::new();
        self.walk(&self.root, &mut Vec::new(), &mut found)?;
        found.sort();
        Ok(found)
    }

    fn walk(&self, dir: &Path, elems: &mut Vec<String>, found: &mut Vec<Coordinate>) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| io_error(e, "walking store", dir))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_error(e, "walking store", dir))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if name == VERSIONS_DIR {
                let escaped = elems.join("/");
                match unescape_path(&escaped).and_then(|p| Coordinate::parse(&p)) {
                    Ok(coordinate) => found.push(coordinate),
                    Err(e) => debug!(path = %path.display(), error = %e, "skipping foreign directory"),
                }
                continue;
            }
            elems.push(name);
            self.walk(&path, elems, found)?;
            elems.pop();
        }
        Ok(())
    }

    fn stage(&self, artifacts: &NewVersion) -> Result<PathBuf> {
        let staging = self
            .root
            .join(STAGING_DIR)
            .join(uuid::Uuid::new_v4().to_string());
        fs::create_dir_all(&staging)
            .map_err(|e| io_error(e, "creating staging directory", &staging))?;

        let info = artifacts.info.to_json()?;
        let record = IntegrityRecord::from_data(&info, &artifacts.manifest, &artifacts.archive);
        let record = serde_json::to_vec_pretty(&record)
            .map_err(|e| StorageError::unavailable("encoding integrity record", e))?;

        let files: [(&str, &[u8]); 4] = [
            (INFO_FILE, &info),
            (MOD_FILE, &artifacts.manifest),
            (ZIP_FILE, &artifacts.archive),
            (INTEGRITY_FILE, &record),
        ];
        for (name, data) in files {
            let path = staging.join(name);
            if let Err(e) = write_synced(&path, data) {
                discard(&staging);
                return Err(io_error(e, "writing staged artifact", &path));
            }
        }
        if let Err(e) = sync_dir(&staging) {
            discard(&staging);
            return Err(io_error(e, "syncing staging directory", &staging));
        }
        Ok(staging)
    }
}

impl VersionStore for DiskStore {
    fn list_versions(&self, coordinate: &Coordinate) -> Result<Vec<Version>> {
        let dir = self.module_dir(coordinate);
        let entries = match with_retry(&dir, || fs::read_dir(&dir)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::module_not_found(coordinate))
            }
            Err(e) => return Err(io_error(e, "listing versions", &dir)),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(e, "listing versions", &dir))?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match unescape_path(&name).and_then(|raw| Version::parse(&raw)) {
                Ok(version) => versions.push(version),
                Err(e) => debug!(%coordinate, entry = %name, error = %e, "ignoring entry"),
            }
        }

        if versions.is_empty() {
            return Err(StorageError::module_not_found(coordinate));
        }
        versions.sort();
        Ok(versions)
    }

    fn info(&self, coordinate: &Coordinate, version: &Version) -> Result<VersionInfo> {
        let data = self.read_artifact(coordinate, version, INFO_FILE)?;
        VersionInfo::from_json(&data)
    }

    fn manifest(&self, coordinate: &Coordinate, version: &Version) -> Result<Vec<u8>> {
        self.read_artifact(coordinate, version, MOD_FILE)
    }

    fn archive(&self, coordinate: &Coordinate, version: &Version) -> Result<Archive> {
        let path = self.version_dir(coordinate, version).join(ZIP_FILE);
        let file = with_retry(&path, || File::open(&path))
            .map_err(|e| read_error(e, coordinate, version, &path))?;
        let len = file
            .metadata()
            .map_err(|e| io_error(e, "reading archive metadata", &path))?
            .len();
        Ok(Archive::new(len, file))
    }

    fn exists(&self, coordinate: &Coordinate, version: &Version) -> Result<bool> {
        Ok(self.version_dir(coordinate, version).is_dir())
    }
}

impl VersionSink for DiskStore {
    fn put_version(
        &self,
        coordinate: &Coordinate,
        version: &Version,
        artifacts: NewVersion,
    ) -> Result<()> {
        if !self.is_writable() {
            return Err(StorageError::invalid(format!(
                "disk store at {} was opened read-only",
                self.root.display()
            )));
        }
        artifacts.validate(version)?;

        let target = self.version_dir(coordinate, version);
        let already_exists = || StorageError::AlreadyExists {
            coordinate: coordinate.to_string(),
            version: version.to_string(),
        };
        if target.is_dir() {
            return Err(already_exists());
        }

        let staging = self.stage(&artifacts)?;

        let parent = self.module_dir(coordinate);
        if let Err(e) = fs::create_dir_all(&parent) {
            discard(&staging);
            return Err(io_error(e, "creating module directory", &parent));
        }

        // A concurrent writer may have published between the check above and
        // here; the rename then fails because the target is a non-empty dir.
        if let Err(e) = fs::rename(&staging, &target) {
            discard(&staging);
            if target.is_dir() {
                return Err(already_exists());
            }
            return Err(io_error(e, "publishing version", &target));
        }
        if let Err(e) = sync_dir(&parent) {
            warn!(path = %parent.display(), error = %e, "could not sync module directory");
        }

        debug!(
            %coordinate,
            %version,
            bytes = artifacts.archive.len(),
            "committed version to disk store"
        );
        Ok(())
    }
}

/// Remove everything under the staging directory. Callers hold the store
/// lock exclusively.
fn clear_staging(root: &Path, staging: &Path) -> Result<()> {
    if !staging.is_dir() {
        return Ok(());
    }
    let leftovers = fs::read_dir(staging)
        .map_err(|e| io_error(e, "listing staging directory", staging))?
        .count();
    if leftovers > 0 {
        warn!(
            root = %root.display(),
            leftovers,
            "discarding interrupted uploads"
        );
    }
    fs::remove_dir_all(staging).map_err(|e| io_error(e, "clearing staging directory", staging))
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn with_retry<T>(path: &Path, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(e) if is_transient(&e) && attempt < MAX_RETRIES => {
                attempt += 1;
                warn!(path = %path.display(), attempt, error = %e, "retrying read");
                thread::sleep(RETRY_BACKOFF * attempt);
            }
            result => return result,
        }
    }
}

fn io_error(e: io::Error, context: &str, path: &Path) -> StorageError {
    StorageError::unavailable(format!("{context} at {}", path.display()), e)
}

fn read_error(e: io::Error, coordinate: &Coordinate, version: &Version, path: &Path) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::version_not_found(coordinate, version)
    } else {
        io_error(e, "reading artifact", path)
    }
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

fn discard(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        warn!(path = %staging.display(), error = %e, "could not remove staging directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;
    use crate::store::Backend;

    fn coord() -> Coordinate {
        Coordinate::parse("example.com/foo").unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn conformance_suite() {
        let dir = tempfile::tempdir().unwrap();
        let factory = || -> Box<dyn Backend> {
            let root = dir.path().join(uuid::Uuid::new_v4().to_string());
            Box::new(DiskStore::open(root).unwrap())
        };
        conformance::run_all(&factory);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let version = v("v1.0.0");
        {
            let store = DiskStore::open(dir.path()).unwrap();
            store
                .put_version(&coord(), &version, conformance::payload(&version, b"zip bytes"))
                .unwrap();
        }

        let store = DiskStore::open(dir.path()).unwrap();
        assert_eq!(store.list_versions(&coord()).unwrap(), vec![version.clone()]);
        let archive = store.archive(&coord(), &version).unwrap();
        assert_eq!(archive.into_bytes().unwrap(), b"zip bytes");
    }

    #[test]
    fn interrupted_upload_is_discarded_on_open() {
        let dir = tempfile::tempdir().unwrap();
        DiskStore::open(dir.path()).unwrap();

        let orphan = dir.path().join(STAGING_DIR).join("orphan");
        fs::create_dir_all(&orphan).unwrap();
        fs::write(orphan.join(ZIP_FILE), b"half written").unwrap();

        let store = DiskStore::open(dir.path()).unwrap();
        assert!(!orphan.exists());
        assert!(store.coordinates().unwrap().is_empty());
    }

    #[test]
    fn staging_survives_while_another_handle_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let serving = DiskStore::open(dir.path()).unwrap();

        let in_flight = dir.path().join(STAGING_DIR).join("in-flight");
        fs::create_dir_all(&in_flight).unwrap();
        fs::write(in_flight.join(ZIP_FILE), b"being written").unwrap();

        let second = DiskStore::open(dir.path()).unwrap();
        assert!(in_flight.join(ZIP_FILE).is_file());
        DiskStore::open_read_only(dir.path()).unwrap();
        assert!(in_flight.join(ZIP_FILE).is_file());

        drop(second);
        drop(serving);
        DiskStore::open(dir.path()).unwrap();
        assert!(!in_flight.exists());
    }

    #[test]
    fn reopening_does_not_disturb_concurrent_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let done = std::sync::atomic::AtomicBool::new(false);

        std::thread::scope(|s| {
            let done = &done;
            let root = dir.path();
            s.spawn(move || {
                while !done.load(std::sync::atomic::Ordering::SeqCst) {
                    DiskStore::open(root).unwrap();
                    let reader = DiskStore::open_read_only(root).unwrap();
                    let _ = reader.coordinates().unwrap();
                }
            });

            for i in 0..60 {
                let version = v(&format!("v1.{i}.0"));
                let archive = vec![i as u8; 64 * 1024];
                store
                    .put_version(&coord(), &version, conformance::payload(&version, &archive))
                    .unwrap();
            }
            done.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        let listed = store.list_versions(&coord()).unwrap();
        assert_eq!(listed.len(), 60);
        for version in &listed {
            assert!(store.verify(&coord(), version).unwrap(), "{version}");
        }
    }

    #[test]
    fn read_only_handle_cannot_publish() {
        let dir = tempfile::tempdir().unwrap();
        let version = v("v1.0.0");
        DiskStore::open(dir.path())
            .unwrap()
            .put_version(&coord(), &version, conformance::payload(&version, b"zip"))
            .unwrap();

        let reader = DiskStore::open_read_only(dir.path()).unwrap();
        assert!(!reader.is_writable());
        assert_eq!(reader.list_versions(&coord()).unwrap(), vec![version]);

        let next = v("v1.1.0");
        let err = reader
            .put_version(&coord(), &next, conformance::payload(&next, b"zip"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Invalid);

        assert!(DiskStore::open_read_only(dir.path().join("missing")).is_err());
    }

    #[test]
    fn upper_case_coordinates_are_escaped_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let coordinate = Coordinate::parse("github.com/Azure/Go").unwrap();
        let version = v("v1.0.0-RC1");
        store
            .put_version(&coordinate, &version, conformance::payload(&version, b"zip"))
            .unwrap();

        assert!(dir
            .path()
            .join("github.com/!azure/!go/@v/v1.0.0-!r!c1")
            .join(ZIP_FILE)
            .is_file());
        assert_eq!(store.list_versions(&coordinate).unwrap(), vec![version]);
        let lower = Coordinate::parse("github.com/azure/go").unwrap();
        assert!(store.list_versions(&lower).is_err());
    }

    #[test]
    fn coordinates_lists_nested_modules() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let version = v("v1.0.0");
        for path in ["example.com/foo", "example.com/foo/bar", "other.org/Baz"] {
            let coordinate = Coordinate::parse(path).unwrap();
            store
                .put_version(&coordinate, &version, conformance::payload(&version, b"zip"))
                .unwrap();
        }

        let listed: Vec<String> = store
            .coordinates()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            listed,
            vec!["example.com/foo", "example.com/foo/bar", "other.org/Baz"]
        );
    }

    #[test]
    fn integrity_verification() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let version = v("v1.0.0");
        store
            .put_version(&coord(), &version, conformance::payload(&version, b"zip"))
            .unwrap();
        assert!(store.verify(&coord(), &version).unwrap());

        // Tamper with the archive
        let zip = store.version_dir(&coord(), &version).join(ZIP_FILE);
        fs::write(&zip, b"tampered").unwrap();
        assert!(!store.verify(&coord(), &version).unwrap());

        assert!(store.verify(&coord(), &v("v2.0.0")).is_err());
    }

    #[test]
    fn stray_entries_are_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let version = v("v1.0.0");
        store
            .put_version(&coord(), &version, conformance::payload(&version, b"zip"))
            .unwrap();

        let module_dir = store.module_dir(&coord());
        fs::create_dir_all(module_dir.join("not-a-version")).unwrap();
        fs::write(module_dir.join("v9.9.9"), b"a file, not a version dir").unwrap();

        assert_eq!(store.list_versions(&coord()).unwrap(), vec![version]);
    }
}
