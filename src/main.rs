//! Thesis Match Daemon
//!
//! Serves the matching core over HTTP, backed by SQLite.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! thesis-match
//!
//! # Start with custom config
//! thesis-match --config /path/to/config.toml
//!
//! # Start with custom HTTP port and storage directory
//! thesis-match --http-port 8096 --storage-dir /data/match
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use thesis_match::services::spawn_logging_listener;
use thesis_match::{Config, HttpServer, Services, SqliteStore};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "thesis-match")]
#[command(about = "Student/supervisor matching service")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "THESIS_MATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Storage directory (database and default config)
    #[arg(long, env = "THESIS_MATCH_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "THESIS_MATCH_HTTP_PORT")]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("thesis_match=info".parse()?))
        .init();

    let args = Args::parse();

    // Load config
    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        "Starting thesis-match"
    );

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let store = Arc::new(SqliteStore::open(&config.storage_dir)?);
    let services = Arc::new(Services::new(
        store,
        config.ranking.into(),
        config.lifecycle.into(),
    )?);
    let listener = spawn_logging_listener(Arc::clone(&services.events));

    let stats = services.tags.stats()?;
    info!(
        db = %config.db_path().display(),
        tags = stats.tag_count,
        similarities = stats.similarity_count,
        "Store ready"
    );

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_server = Arc::new(HttpServer::new(Arc::clone(&services), http_addr));

    info!("HTTP API available at http://{}", http_addr);
    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    listener.abort();

    Ok(())
}
