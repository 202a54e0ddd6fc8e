//! Agenda RPC Server - HTTP backend for the contacts agenda.
//!
//! Loads configuration, wires the agenda core and serves it over HTTP until
//! interrupted.

use agenda_core::{AgendaApi, AgendaConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "agenda-rpc")]
#[command(about = "HTTP server for the contacts agenda")]
struct Args {
    /// JSON configuration file
    #[arg(short, long, env = "AGENDA_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (0 = auto-assign; overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Keep the store and cache in memory
    #[arg(long)]
    ephemeral: bool,

    /// Seconds between expired cache sweeps (0 disables)
    #[arg(long, default_value = "60")]
    cleanup_interval: u64,
}

fn init_logging(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.debug, args.json_logs);

    info!("Starting Agenda RPC Server");

    let mut config = AgendaConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let host = config.server.host.clone();
    let port = config.server.port;

    let api = AgendaApi::builder(config)
        .ephemeral(args.ephemeral)
        .build()
        .context("Failed to initialize agenda")?;

    let cleanup = (args.cleanup_interval > 0)
        .then(|| api.spawn_cache_cleanup(Duration::from_secs(args.cleanup_interval)));

    let addr = agenda_rpc::start_server(api, &host, port)
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;

    // Parsed by process supervisors and the integration tests
    println!("AGENDA_PORT={}", addr.port());

    info!("Agenda server running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    if let Some(handle) = cleanup {
        handle.abort();
    }

    Ok(())
}
