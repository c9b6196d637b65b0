//! Heartbeat Driver
//!
//! Delivers `"<message> <n>"` to every connection at a fixed interval,
//! counting from 1, until the server stops accepting deliveries.

use std::time::Duration;

use tracing::{debug, info};

use crate::config::HeartbeatConfig;
use crate::server::ServerHandle;

pub struct Heartbeat {
    server: ServerHandle,
    interval: Duration,
    message: String,
}

impl Heartbeat {
    pub fn new(server: ServerHandle, interval: Duration, message: impl Into<String>) -> Self {
        Self {
            server,
            interval,
            message: message.into(),
        }
    }

    pub fn from_config(server: ServerHandle, config: &HeartbeatConfig) -> Self {
        Self::new(server, config.interval, config.message.clone())
    }

    /// Run until a delivery is refused; returns the number delivered
    pub async fn run(self) -> u64 {
        info!(interval = ?self.interval, "Heartbeat started");

        let mut sequence = 1u64;
        loop {
            tokio::time::sleep(self.interval).await;

            let payload = format!("{} {}", self.message, sequence);
            if !self.server.deliver(payload) {
                break;
            }
            debug!(sequence, "Heartbeat delivered");
            sequence += 1;
        }

        let delivered = sequence - 1;
        info!(delivered, "Heartbeat stopped, server no longer accepting deliveries");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::metrics::Metrics;
    use crate::protocol::FixedSnapshotProvider;
    use crate::server::Server;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_heartbeat_stops_when_server_gone() {
        let mut config = Config::default();
        config.server.bind_addr = "127.0.0.1:0".parse().unwrap();
        let server = Server::bind(
            &config,
            Arc::new(FixedSnapshotProvider::default()),
            Arc::new(Metrics::new().unwrap()),
        )
        .await
        .unwrap();

        let heartbeat = Heartbeat::new(server.handle(), Duration::from_millis(1), "HEARTBEAT DEMO");
        drop(server);

        assert_eq!(heartbeat.run().await, 0);
    }
}
