//! Version metadata ("info") records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::version::Version;

/// The small metadata record served for `{version}.info`.
///
/// Serialized as `{"Version":"v1.0.0","Time":"2018-02-14T00:45:20Z"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// The version string.
    #[serde(rename = "Version")]
    pub version: String,
    /// Commit timestamp.
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
}

/// Shape accepted from uploads: both fields optional, either case.
#[derive(Debug, Deserialize)]
struct UploadedInfo {
    #[serde(default, rename = "Version", alias = "version")]
    version: Option<String>,
    #[serde(default, rename = "Time", alias = "time")]
    time: Option<DateTime<Utc>>,
}

impl VersionInfo {
    /// Create a record stamped with the current time.
    pub fn now(version: &Version) -> Self {
        VersionInfo {
            version: version.to_string(),
            time: Utc::now(),
        }
    }

    /// Parse an uploaded info part for `version`.
    ///
    /// A missing version is filled from `version`, a present one must match
    /// it. A missing time becomes the current time.
    pub fn from_upload(bytes: &[u8], version: &Version) -> Result<Self> {
        let uploaded: UploadedInfo = serde_json::from_slice(bytes)
            .map_err(|e| StorageError::invalid(format!("info is not valid JSON: {e}")))?;

        if let Some(declared) = &uploaded.version {
            if declared != version.as_str() {
                return Err(StorageError::invalid(format!(
                    "info declares version {declared} but upload is for {version}"
                )));
            }
        }

        Ok(VersionInfo {
            version: version.to_string(),
            time: uploaded.time.unwrap_or_else(Utc::now),
        })
    }

    /// Encode as the JSON document served to clients.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StorageError::unavailable("encoding info", e))
    }

    /// Decode a stored info document.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| StorageError::unavailable("decoding stored info", e))
    }
}
