//! Honeypot proxy
//!
//! Captures every inbound call, forwards it to the real system, and records
//! the upstream reply correlated to the captured request.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::proxy ──▶ capture::pipeline ──▶ forward::engine ──▶ Upstream
//!                                     │      ▲                │
//!                                     ▼      │                │
//!                               store (request, response) ◀───┘
//!
//!     Operator ──▶ http::audit ──▶ store (query, delete)
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use honeypot_proxy::config::loader::{from_env_or_default, load_config};
use honeypot_proxy::lifecycle::{bootstrap, signals, Shutdown};
use honeypot_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "honeypot-proxy", version)]
#[command(about = "Capture, forward and correlate proxied traffic", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => from_env_or_default()?,
    };

    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        "honeypot-proxy starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        storage = ?config.storage.backend,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let server = bootstrap(config).await?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
