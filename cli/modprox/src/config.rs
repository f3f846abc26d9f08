//! `modprox.toml` parsing and runtime configuration.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use modprox_protocol::Limits;

/// File name searched for when no `--config` is given.
pub const CONFIG_FILE: &str = "modprox.toml";

/// The top-level configuration. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener settings.
    pub server: ServerConfig,
    /// Backend selection.
    pub storage: StorageConfig,
    /// Upload size limits.
    pub limits: Limits,
    /// Log filter.
    pub log: LogConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Which storage backend serves requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-lifetime, in-memory storage.
    #[default]
    Memory,
    /// Durable storage under `storage.root`.
    Disk,
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Root directory of the disk backend.
    pub root: Option<PathBuf>,
}

impl StorageConfig {
    /// The disk root, required whenever the disk backend is in use.
    pub fn disk_root(&self) -> Result<&Path> {
        match &self.root {
            Some(root) => Ok(root),
            None => bail!("the disk backend needs a root directory (--root or [storage] root)"),
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. `info` or `modprox_storage=debug`.
    pub filter: Option<String>,
}

impl ProxyConfig {
    /// Search upward from `start_dir` for a `modprox.toml` file, parse and
    /// return it along with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Ok(Some((Self::load(&candidate)?, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Read and parse one configuration file.
    ///
    /// A relative `storage.root` is taken relative to the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config =
            Self::parse(&content).with_context(|| format!("parsing {}", path.display()))?;
        if let (Some(root), Some(base)) = (&config.storage.root, path.parent()) {
            if root.is_relative() {
                config.storage.root = Some(base.join(root));
            }
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Resolve the configuration for this invocation: an explicit file, else
    /// the nearest `modprox.toml` above `cwd`, else defaults.
    pub fn resolve(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(Self::find_and_load(cwd)?
                .map(|(config, _)| config)
                .unwrap_or_default()),
        }
    }
}
