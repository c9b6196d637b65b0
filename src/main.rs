//! Syncfeed - snapshot and broadcast TCP server

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use syncfeed::{
    config::{Config, ConfigManager},
    metrics::{Metrics, MetricsServer},
    FixedSnapshotProvider, Heartbeat, Server, SnapshotProvider,
};

/// CLI arguments for Syncfeed
#[derive(Parser, Debug)]
#[command(name = "syncfeed")]
#[command(about = "Syncfeed - snapshot and broadcast TCP server")]
#[command(version)]
#[command(long_about = "
Syncfeed - snapshot and broadcast TCP server

Clients that send a record whose first space-delimited token is `sync`
receive the full snapshot (executions, orders, positions, sync-done marker)
as one byte stream. Broadcast payloads are pushed to every live connection.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file, or environment variables when the file does not exist
3. Built-in defaults

Environment variables are not read while a configuration file is present.

Environment variables:
  SYNCFEED_BIND_ADDR           - Bind address (e.g., 127.0.0.1:8989)
  SYNCFEED_BUFFER_SIZE         - Receive buffer size in bytes
  SYNCFEED_GC_INTERVAL         - Registry garbage collection interval (e.g., 30s)
  SYNCFEED_SHUTDOWN_TIMEOUT    - Time to wait for connections on shutdown
  SYNCFEED_HEARTBEAT_INTERVAL  - Enable the heartbeat with this interval
  SYNCFEED_LOG_LEVEL           - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "syncfeed.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "Bind address (e.g., 127.0.0.1:8989)")]
    pub bind: Option<String>,

    /// Port to bind to (overrides config file)
    #[arg(short, long, help = "Port to bind to")]
    pub port: Option<u16>,

    /// Receive buffer size in bytes
    #[arg(long, help = "Receive buffer size in bytes")]
    pub buffer_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level (defaults to the configured level)")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Enable the heartbeat driver
    #[arg(long, help = "Broadcast a numbered heartbeat to every client")]
    pub heartbeat: bool,

    /// Heartbeat interval (implies --heartbeat)
    #[arg(long, value_parser = humantime::parse_duration, help = "Heartbeat interval (e.g., 5s)")]
    pub heartbeat_interval: Option<Duration>,

    /// Prometheus endpoint address
    #[arg(long, help = "Serve Prometheus metrics on this address")]
    pub metrics_addr: Option<SocketAddr>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // CLI args override either the config file or, without one, the environment
    let mut config = ConfigManager::load(&args.config)?;

    init_tracing(&args, &config)?;

    info!(
        "Starting Syncfeed v{} - snapshot and broadcast TCP server",
        env!("CARGO_PKG_VERSION")
    );

    config.merge_with_cli_args(
        args.bind.as_deref(),
        args.port,
        args.buffer_size,
        args.heartbeat_interval,
        args.heartbeat,
        args.metrics_addr,
    );

    // Final validation after all overrides
    config
        .validate()
        .context("Final configuration validation failed")?;

    log_config_summary(&config);

    if args.validate_config {
        info!("Configuration is valid");
        return Ok(());
    }

    let metrics = Arc::new(Metrics::new()?);
    let provider: Arc<dyn SnapshotProvider> =
        Arc::new(FixedSnapshotProvider::from_config(&config.snapshot));

    let metrics_handle = match config.monitoring.metrics_addr {
        Some(addr) => {
            let metrics_server = MetricsServer::bind(Arc::clone(&metrics), addr).await?;
            Some(tokio::spawn(async move {
                if let Err(e) = metrics_server.run().await {
                    error!("Metrics server error: {}", e);
                }
            }))
        }
        None => None,
    };

    let server = Server::bind(&config, provider, Arc::clone(&metrics)).await?;

    let heartbeat_handle = if config.heartbeat.enabled {
        let heartbeat = Heartbeat::from_config(server.handle(), &config.heartbeat);
        Some(tokio::spawn(heartbeat.run()))
    } else {
        None
    };

    info!("Press Ctrl+C or send SIGTERM/SIGINT/SIGQUIT to shut down");

    let result = server.run().await;
    if let Err(e) = &result {
        error!("Server error: {:#}", e);
    }

    if let Some(handle) = heartbeat_handle {
        handle.abort();
    }
    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    info!(
        accepted = metrics.connections_accepted(),
        syncs = metrics.sync_requests(),
        broadcasts = metrics.broadcasts(),
        "Server shutdown complete"
    );

    result
}

fn log_config_summary(config: &Config) {
    info!("Configuration summary:");
    info!("  Bind address: {}", config.server.bind_addr);
    info!("  Buffer size: {} bytes", config.server.buffer_size);
    info!("  GC interval: {:?}", config.server.gc_interval);
    info!("  Shutdown timeout: {:?}", config.server.shutdown_timeout);
    info!(
        "  Heartbeat: {}",
        if config.heartbeat.enabled {
            format!("every {:?}", config.heartbeat.interval)
        } else {
            "disabled".to_string()
        }
    );
    match config.monitoring.metrics_addr {
        Some(addr) => info!("  Metrics endpoint: {}", addr),
        None => info!("  Metrics endpoint: disabled"),
    }
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, config: &Config) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level
            .as_deref()
            .unwrap_or(&config.monitoring.log_level)
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
