//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::*;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub snapshot: SnapshotConfig,
    pub heartbeat: HeartbeatConfig,
    pub monitoring: MonitoringConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Receive buffer capacity of every connection
    pub buffer_size: usize,
    pub listen_backlog: u32,
    /// How often expired registry entries are reclaimed
    #[serde(with = "humantime_serde")]
    pub gc_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Sizes of the stub snapshot segments
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub execution_bytes: usize,
    pub orders_bytes: usize,
    pub positions_bytes: usize,
    pub sync_done_bytes: usize,
}

/// Heartbeat demo driver configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub message: String,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8989)),
            buffer_size: DEFAULT_BUFFER_SIZE,
            listen_backlog: 1024,
            gc_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            execution_bytes: DEFAULT_EXECUTION_BYTES,
            orders_bytes: DEFAULT_ORDERS_BYTES,
            positions_bytes: DEFAULT_POSITIONS_BYTES,
            sync_done_bytes: DEFAULT_SYNC_DONE_BYTES,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(5),
            message: "HEARTBEAT DEMO".to_string(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_addr: None,
        }
    }
}
