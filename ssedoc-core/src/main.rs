//! ssedoc-core - upload processing service
//!
//! Accepts batches of documents over HTTP, extracts their text concurrently and
//! streams per-file progress over Server-Sent Events.

use anyhow::{Context, Result};
use clap::Parser;
use ssedoc_common::config::TomlConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ssedoc_core::AppState;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "ssedoc-core", version, about = "Document upload processing with SSE progress")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "SSEDOC_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on, overrides the configuration file
    #[arg(short, long, env = "SSEDOC_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::resolve(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let default_filter = format!(
        "ssedoc_core={level},ssedoc_common={level},tower_http={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ssedoc-core");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        timeout_secs = config.upload.timeout_secs,
        max_files = config.upload.max_files,
        stream_progress = config.upload.stream_progress,
        "Upload settings"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;

    let state = AppState::new(config);
    let app = ssedoc_core::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
