//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{Context, bail};
use std::path::Path;
use std::net::SocketAddr;
use std::time::Duration;

/// Largest accepted receive buffer
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load from `path` if it exists, otherwise from `SYNCFEED_*` variables.
    ///
    /// The sources are not layered: environment variables are ignored
    /// whenever the file is present.
    pub fn load(path: &Path) -> Result<Config> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Self::load_from_env()
        }
    }

    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            
            config.validate()
                .with_context(|| "Configuration validation failed")?;
            
            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();
        
        if let Ok(bind_addr) = std::env::var("SYNCFEED_BIND_ADDR") {
            config.server.bind_addr = bind_addr.parse::<SocketAddr>()
                .with_context(|| format!("Invalid SYNCFEED_BIND_ADDR: {}", bind_addr))?;
        }
        
        if let Ok(buffer_size) = std::env::var("SYNCFEED_BUFFER_SIZE") {
            config.server.buffer_size = buffer_size.parse::<usize>()
                .with_context(|| format!("Invalid SYNCFEED_BUFFER_SIZE: {}", buffer_size))?;
        }
        
        if let Ok(interval) = std::env::var("SYNCFEED_GC_INTERVAL") {
            config.server.gc_interval = humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid SYNCFEED_GC_INTERVAL: {}", interval))?;
        }
        
        if let Ok(timeout) = std::env::var("SYNCFEED_SHUTDOWN_TIMEOUT") {
            config.server.shutdown_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid SYNCFEED_SHUTDOWN_TIMEOUT: {}", timeout))?;
        }
        
        if let Ok(interval) = std::env::var("SYNCFEED_HEARTBEAT_INTERVAL") {
            config.heartbeat.enabled = true;
            config.heartbeat.interval = humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid SYNCFEED_HEARTBEAT_INTERVAL: {}", interval))?;
        }
        
        if let Ok(log_level) = std::env::var("SYNCFEED_LOG_LEVEL") {
            config.monitoring.log_level = log_level;
        }
        
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;
        
        self.validate_heartbeat_config()
            .with_context(|| "Heartbeat configuration validation failed")?;
        
        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;
        
        Ok(())
    }
    
    /// Validate server configuration
    fn validate_server_config(&self) -> Result<()> {
        if self.server.buffer_size == 0 {
            bail!("buffer_size must be greater than 0");
        }
        
        if self.server.buffer_size > MAX_BUFFER_SIZE {
            bail!("buffer_size cannot exceed 1MB");
        }
        
        if self.server.listen_backlog == 0 {
            bail!("listen_backlog must be greater than 0");
        }
        
        if self.server.gc_interval.is_zero() {
            bail!("gc_interval must be greater than 0");
        }
        
        Ok(())
    }
    
    /// Validate heartbeat configuration
    fn validate_heartbeat_config(&self) -> Result<()> {
        if self.heartbeat.enabled && self.heartbeat.interval.is_zero() {
            bail!("heartbeat.interval must be greater than 0 when the heartbeat is enabled");
        }
        
        Ok(())
    }
    
    /// Validate monitoring configuration
    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!("monitoring.log_level must be one of: {}", valid_log_levels.join(", "));
        }
        
        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        buffer_size: Option<usize>,
        heartbeat_interval: Option<Duration>,
        heartbeat: bool,
        metrics_addr: Option<SocketAddr>,
    ) {
        // Override bind address if provided
        if let Some(bind_str) = bind {
            if let Ok(addr) = bind_str.parse::<SocketAddr>() {
                self.server.bind_addr = addr;
                tracing::info!("CLI override: bind address set to {}", addr);
            } else {
                tracing::warn!("Invalid bind address provided: {}", bind_str);
            }
        }

        // Override port if provided
        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(buffer_size) = buffer_size {
            self.server.buffer_size = buffer_size;
            tracing::info!("CLI override: buffer size set to {} bytes", buffer_size);
        }

        if heartbeat {
            self.heartbeat.enabled = true;
            tracing::info!("CLI override: heartbeat enabled");
        }

        if let Some(interval) = heartbeat_interval {
            self.heartbeat.enabled = true;
            self.heartbeat.interval = interval;
            tracing::info!("CLI override: heartbeat interval set to {:?}", interval);
        }

        if let Some(addr) = metrics_addr {
            self.monitoring.metrics_addr = Some(addr);
            tracing::info!("CLI override: metrics endpoint set to {}", addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let mut config = Config::default();
        config.server.buffer_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_buffer_rejected() {
        let mut config = Config::default();
        config.server.buffer_size = MAX_BUFFER_SIZE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_gc_interval_rejected() {
        let mut config = Config::default();
        config.server.gc_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enabled_heartbeat_needs_interval() {
        let mut config = Config::default();
        config.heartbeat.interval = Duration::ZERO;
        assert!(config.validate().is_ok());

        config.heartbeat.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = Config::default();
        config.monitoring.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();
        config.merge_with_cli_args(
            Some("0.0.0.0:7000"),
            Some(7001),
            Some(4096),
            Some(Duration::from_secs(2)),
            false,
            Some("127.0.0.1:9191".parse().unwrap()),
        );

        assert_eq!(config.server.bind_addr, "0.0.0.0:7001".parse::<SocketAddr>().unwrap());
        assert_eq!(config.server.buffer_size, 4096);
        assert!(config.heartbeat.enabled);
        assert_eq!(config.heartbeat.interval, Duration::from_secs(2));
        assert_eq!(config.monitoring.metrics_addr, Some("127.0.0.1:9191".parse::<SocketAddr>().unwrap()));
    }

    #[test]
    fn test_invalid_cli_bind_is_ignored() {
        let mut config = Config::default();
        config.merge_with_cli_args(Some("not-an-address"), None, None, None, false, None);
        assert_eq!(config.server.bind_addr, Config::default().server.bind_addr);
    }
}
