//! `modprox upload`: publish a version from local files.
//!
//! Goes through the same resolver and upload form as an HTTP upload, so the
//! same validation and size limits apply.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use modprox_protocol::{Limits, Part, Resolver};
use modprox_storage::{Coordinate, DiskStore, Version};

/// Files holding the three upload parts.
#[derive(Debug, Clone)]
pub struct UploadFiles {
    pub info: PathBuf,
    pub manifest: PathBuf,
    pub archive: PathBuf,
}

/// Run `modprox upload <module> <version>`.
pub fn run(
    root: &Path,
    limits: &Limits,
    module: &str,
    version: &str,
    files: &UploadFiles,
) -> Result<()> {
    let coordinate = Coordinate::parse(module)?;
    let version = Version::parse(version)?;

    let store = DiskStore::open(root)
        .with_context(|| format!("opening disk store at {}", root.display()))?;
    let resolver = Resolver::from_backend(Arc::new(store)).with_limits(limits.clone());

    let mut form = resolver.upload_form();
    for (part, path) in [
        (Part::Info, &files.info),
        (Part::Manifest, &files.manifest),
        (Part::Archive, &files.archive),
    ] {
        let len = std::fs::metadata(path)
            .with_context(|| format!("reading {}", path.display()))?
            .len();
        form.check_size(part, len)?;
        let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        form.add_part(part, data)?;
    }

    let response = resolver.upload(&coordinate, &version, form);
    let code = response.status.code();
    if !response.status.is_success() {
        let body = response.into_bytes().unwrap_or_default();
        bail!(
            "upload rejected ({code}): {}",
            String::from_utf8_lossy(&body).trim_end()
        );
    }

    println!("Published {coordinate}@{version}");
    Ok(())
}
