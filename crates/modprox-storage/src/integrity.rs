//! Content hashes for committed artifacts.
//!
//! The disk backend writes an [`IntegrityRecord`] next to every committed
//! version. Versions are publish-once, so a hash mismatch can only mean the
//! medium was tampered with or corrupted.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A content hash (SHA-256 hex digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute the SHA-256 hash of the given data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex_encode(&hasher.finalize()))
    }

    /// Hash everything a reader yields without buffering it whole.
    pub fn compute_reader(reader: &mut dyn std::io::Read) -> std::io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(ContentHash(hex_encode(&hasher.finalize())))
    }

    /// Get the hex string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that the given data matches this hash.
    pub fn verify(&self, data: &[u8]) -> bool {
        ContentHash::compute(data) == *self
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Hashes of the three artifacts of one committed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityRecord {
    /// SHA-256 of the stored info document.
    pub info: ContentHash,
    /// SHA-256 of the module manifest.
    #[serde(rename = "mod")]
    pub manifest: ContentHash,
    /// SHA-256 of the archive.
    #[serde(rename = "zip")]
    pub archive: ContentHash,
}

impl IntegrityRecord {
    /// Create a record from raw artifact bytes.
    pub fn from_data(info: &[u8], manifest: &[u8], archive: &[u8]) -> Self {
        IntegrityRecord {
            info: ContentHash::compute(info),
            manifest: ContentHash::compute(manifest),
            archive: ContentHash::compute(archive),
        }
    }
}
