//! `modprox serve`: run the HTTP proxy.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use modprox_protocol::Resolver;
use modprox_storage::{DiskStore, MemoryStore};

use crate::config::{BackendKind, ProxyConfig};
use crate::server;

/// Construct the configured backend and wrap it in a resolver.
pub fn resolver(config: &ProxyConfig) -> Result<Resolver> {
    let resolver = match config.storage.backend {
        BackendKind::Memory => {
            info!("using in-memory storage; published versions will not survive a restart");
            Resolver::from_backend(Arc::new(MemoryStore::new()))
        }
        BackendKind::Disk => {
            let root = config.storage.disk_root()?;
            let store = DiskStore::open(root)
                .with_context(|| format!("opening disk store at {}", root.display()))?;
            Resolver::from_backend(Arc::new(store))
        }
    };
    Ok(resolver.with_limits(config.limits.clone()))
}

/// Run `modprox serve`.
pub fn run(config: &ProxyConfig) -> Result<()> {
    let resolver = resolver(config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(server::serve(&config.server.bind, resolver))
}
