//! Storage capabilities for the modprox module proxy.
//!
//! A backend answers two questions: what versions exist for a module and
//! what bytes were committed for each of them ([`VersionStore`]), and how a
//! new version gets committed ([`VersionSink`]). Anything implementing both
//! is a [`Backend`] and can be handed to the protocol layer unchanged.
//!
//! # Invariants
//!
//! - A version is published at most once. A second publish of the same
//!   coordinate and version fails with [`StorageError::AlreadyExists`] and
//!   leaves the first commit untouched.
//! - A version becomes visible all at once: info, manifest and archive are
//!   either all fetchable or none are.
//! - Every listed version is fetchable, and every fetchable version is listed.
//!
//! Two backends ship with the crate: [`MemoryStore`] for tests and ephemeral
//! deployments, and [`DiskStore`] which survives restarts.

pub mod coordinate;
pub mod disk;
pub mod error;
pub mod info;
pub mod integrity;
pub mod memory;
pub mod store;
pub mod version;

#[cfg(test)]
pub(crate) mod conformance;

// Re-exports for convenience.
pub use coordinate::{escape_path, unescape_path, Coordinate};
pub use disk::DiskStore;
pub use error::{ErrorKind, Result, StorageError};
pub use info::VersionInfo;
pub use integrity::{ContentHash, IntegrityRecord};
pub use memory::MemoryStore;
pub use store::{Archive, Backend, NewVersion, VersionSink, VersionStore};
pub use version::{latest, Version};
