//! modprox: a module proxy server and storage administration CLI.

mod commands;
mod config;
mod server;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::{BackendKind, ProxyConfig};

#[derive(Parser)]
#[command(name = "modprox", version, about = "Module proxy server")]
struct Cli {
    /// Configuration file (default: nearest modprox.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level regardless of other settings
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP proxy
    Serve {
        /// Socket address to listen on
        #[arg(long)]
        bind: Option<String>,
        /// Storage backend
        #[arg(long, value_enum)]
        backend: Option<BackendKind>,
        /// Root directory of the disk backend
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// List the versions of a module in a disk store
    List {
        /// Module path, e.g. github.com/org/repo (all modules if omitted)
        module: Option<String>,
        /// Root directory of the disk store
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Publish a version into a disk store
    Upload {
        /// Module path, e.g. github.com/org/repo
        module: String,
        /// Version, e.g. v1.2.3
        version: String,
        /// Info document (JSON)
        #[arg(long)]
        info: PathBuf,
        /// Module manifest
        #[arg(long = "mod")]
        manifest: PathBuf,
        /// Module archive
        #[arg(long = "zip")]
        archive: PathBuf,
        /// Root directory of the disk store
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Check every stored version against its integrity record
    Verify {
        /// Root directory of the disk store
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let mut config = ProxyConfig::resolve(cli.config.as_deref(), &cwd)?;
    init_logging(cli.verbose, config.log.filter.as_deref());

    match cli.command {
        Commands::Serve {
            bind,
            backend,
            root,
        } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(backend) = backend {
                config.storage.backend = backend;
            }
            if root.is_some() {
                config.storage.root = root;
            }
            commands::serve::run(&config)
        }

        Commands::List { module, root } => {
            let root = disk_root(&mut config, root)?;
            commands::list::run(&root, module.as_deref())
        }

        Commands::Upload {
            module,
            version,
            info,
            manifest,
            archive,
            root,
        } => {
            let root = disk_root(&mut config, root)?;
            let files = commands::upload::UploadFiles {
                info,
                manifest,
                archive,
            };
            commands::upload::run(&root, &config.limits, &module, &version, &files)
        }

        Commands::Verify { root } => {
            let root = disk_root(&mut config, root)?;
            commands::verify::run(&root)
        }
    }
}

/// The disk root for the administration commands: the flag, else the
/// configured root.
fn disk_root(config: &mut ProxyConfig, flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if flag.is_some() {
        config.storage.root = flag;
    }
    Ok(config.storage.disk_root()?.to_path_buf())
}

/// Install the global subscriber. `--verbose` wins over `RUST_LOG`, which
/// wins over the configured filter.
fn init_logging(verbose: bool, configured: Option<&str>) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(configured.unwrap_or("info")))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
