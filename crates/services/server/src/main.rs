//! skiffd - standalone FTP server daemon
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:2021, serving the current directory)
//! cargo run -p skiff-server
//!
//! # Start from a config file
//! SKIFF_CONFIG=/etc/skiff/skiffd.toml cargo run -p skiff-server
//!
//! # With logging
//! RUST_LOG=debug cargo run -p skiff-server
//! ```
//!
//! # Environment Variables
//!
//! - `SKIFF_CONFIG`: Path to a TOML configuration file
//! - `SKIFF_HOSTNAME` / `SKIFF_PORT` / `SKIFF_HOMEDIR` / `SKIFF_GUEST` /
//!   `SKIFF_EXTERNAL_IP` / `SKIFF_PASV_PORTS` / `SKIFF_TIMEOUT_SECS` /
//!   `SKIFF_WORKERS`: individual config overrides
//! - `RUST_LOG`: Logging level (default: `info`)

use std::sync::Arc;

use anyhow::Context;
use skiff_core::{FtpConfig, FtpListener, FtpState, LocalFileSystem, StaticUserStore};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let mut config = match std::env::var("SKIFF_CONFIG") {
        Ok(path) => FtpConfig::load(std::path::Path::new(&path))
            .with_context(|| format!("loading config from {}", path))?,
        Err(_) => FtpConfig::default(),
    };
    config.apply_env_overrides().context("applying SKIFF_* overrides")?;
    if config.workers == 0 {
        config.workers = num_cpus::get();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind_addr(),
        homedir = %config.homedir.display(),
        guest = config.guest,
        "skiffd starting"
    );

    // Create tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("skiffd")
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let filesystem = Arc::new(LocalFileSystem::new(
            config.homedir.clone(),
            config.owner.clone(),
        ));
        let users = Arc::new(StaticUserStore::new(&config.users));
        let state = FtpState::new(config, filesystem, users);

        let listener = FtpListener::bind(state).await.map_err(|e| {
            error!("Failed to bind FTP listener: {}", e);
            e
        })?;
        let shutdown = listener.shutdown_handle();

        // Wind down on ctrl-c: stop accepting and tell live sessions
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                let _ = shutdown.send(());
            }
        });

        listener.run().await.map_err(|e| {
            error!("Server error: {}", e);
            e
        })?;

        Ok::<(), skiff_core::Error>(())
    })?;

    info!("skiffd shutdown complete");
    Ok(())
}
