//! `modprox verify`: recheck stored artifacts against their integrity records.

use std::path::Path;

use anyhow::{bail, Context, Result};

use modprox_storage::{Coordinate, DiskStore, Version, VersionStore};

/// Outcome of a full-store check.
#[derive(Debug, Default)]
pub struct VerifyReport {
    pub checked: usize,
    pub mismatched: Vec<(Coordinate, Version)>,
}

/// Check every version under `store`.
pub fn check(store: &DiskStore) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();
    for coordinate in store.coordinates()? {
        for version in store.list_versions(&coordinate)? {
            report.checked += 1;
            if !store.verify(&coordinate, &version)? {
                report.mismatched.push((coordinate.clone(), version));
            }
        }
    }
    Ok(report)
}

/// Run `modprox verify`. Fails if any version does not match its record.
pub fn run(root: &Path) -> Result<()> {
    let store = DiskStore::open_read_only(root)
        .with_context(|| format!("opening disk store at {}", root.display()))?;
    let report = check(&store)?;

    for (coordinate, version) in &report.mismatched {
        println!("  MISMATCH  {coordinate}@{version}");
    }
    println!(
        "Checked {} versions, {} mismatched",
        report.checked,
        report.mismatched.len()
    );

    if !report.mismatched.is_empty() {
        bail!(
            "{} version(s) failed integrity verification",
            report.mismatched.len()
        );
    }
    Ok(())
}
