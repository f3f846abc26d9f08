//! `modprox list`: show what a disk store holds.

use std::path::Path;

use anyhow::{Context, Result};

use modprox_storage::{Coordinate, DiskStore, ErrorKind, Version, VersionStore};

/// Versions of `module` in the store at `root`, ascending.
pub fn versions(root: &Path, module: &str) -> Result<Vec<Version>> {
    let store = open(root)?;
    let coordinate = Coordinate::parse(module)?;
    Ok(store.list_versions(&coordinate)?)
}

/// Run `modprox list [<module>]`.
///
/// With a module, prints its versions one per line; without, prints every
/// module in the store.
pub fn run(root: &Path, module: Option<&str>) -> Result<()> {
    match module {
        Some(module) => match versions(root, module) {
            Ok(versions) => {
                for version in versions {
                    println!("{version}");
                }
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                println!("No versions of {module} are published.");
                Ok(())
            }
            Err(e) => Err(e),
        },
        None => {
            let store = open(root)?;
            let coordinates = store.coordinates()?;
            if coordinates.is_empty() {
                println!("Store is empty.");
            }
            for coordinate in coordinates {
                let count = store.list_versions(&coordinate)?.len();
                println!("{coordinate} ({count} versions)");
            }
            Ok(())
        }
    }
}

fn open(root: &Path) -> Result<DiskStore> {
    DiskStore::open_read_only(root)
        .with_context(|| format!("opening disk store at {}", root.display()))
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<modprox_storage::StorageError>()
        .is_some_and(|e| e.kind() == ErrorKind::NotFound)
}
