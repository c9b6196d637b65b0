//! Metrics Collector

use prometheus::{IntCounter, IntGauge, Registry, TextEncoder};
use tracing::error;

use crate::Result;

/// Collects and exports server metrics
pub struct Metrics {
    prometheus_registry: Registry,

    connections_accepted_total: IntCounter,
    connections_closed_total: IntCounter,
    sync_requests_total: IntCounter,
    broadcasts_total: IntCounter,
    bytes_written_total: IntCounter,
    registry_handles: IntGauge,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self> {
        let prometheus_registry = Registry::new();

        let connections_accepted_total = IntCounter::new(
            "syncfeed_connections_accepted_total",
            "Total number of accepted client connections",
        )?;
        let connections_closed_total = IntCounter::new(
            "syncfeed_connections_closed_total",
            "Total number of connections whose pipeline has halted",
        )?;
        let sync_requests_total = IntCounter::new(
            "syncfeed_sync_requests_total",
            "Total number of sync requests answered with a snapshot",
        )?;
        let broadcasts_total = IntCounter::new(
            "syncfeed_broadcasts_total",
            "Total number of payloads broadcast to all live connections",
        )?;
        let bytes_written_total = IntCounter::new(
            "syncfeed_bytes_written_total",
            "Total bytes fully transmitted to clients",
        )?;
        let registry_handles = IntGauge::new(
            "syncfeed_registry_handles",
            "Connection handles remaining after the last garbage collection",
        )?;

        prometheus_registry.register(Box::new(connections_accepted_total.clone()))?;
        prometheus_registry.register(Box::new(connections_closed_total.clone()))?;
        prometheus_registry.register(Box::new(sync_requests_total.clone()))?;
        prometheus_registry.register(Box::new(broadcasts_total.clone()))?;
        prometheus_registry.register(Box::new(bytes_written_total.clone()))?;
        prometheus_registry.register(Box::new(registry_handles.clone()))?;

        Ok(Self {
            prometheus_registry,
            connections_accepted_total,
            connections_closed_total,
            sync_requests_total,
            broadcasts_total,
            bytes_written_total,
            registry_handles,
        })
    }

    pub fn connection_accepted(&self) {
        self.connections_accepted_total.inc();
    }

    pub fn connection_closed(&self) {
        self.connections_closed_total.inc();
    }

    pub fn sync_served(&self) {
        self.sync_requests_total.inc();
    }

    pub fn broadcast_sent(&self) {
        self.broadcasts_total.inc();
    }

    /// Record one fully transmitted outgoing entry
    pub fn bytes_written(&self, bytes: usize) {
        self.bytes_written_total.inc_by(bytes as u64);
    }

    /// Record the registry size reported by a garbage-collection pass
    pub fn set_registry_handles(&self, handles: usize) {
        self.registry_handles.set(handles as i64);
    }

    pub fn connections_accepted(&self) -> u64 {
        self.connections_accepted_total.get()
    }

    pub fn connections_closed(&self) -> u64 {
        self.connections_closed_total.get()
    }

    pub fn sync_requests(&self) -> u64 {
        self.sync_requests_total.get()
    }

    pub fn broadcasts(&self) -> u64 {
        self.broadcasts_total.get()
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.bytes_written_total.get()
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.prometheus_registry.gather();
        
        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.connections_accepted(), 0);
        assert_eq!(metrics.connections_closed(), 0);
        assert_eq!(metrics.sync_requests(), 0);
        assert_eq!(metrics.broadcasts(), 0);
        assert_eq!(metrics.total_bytes_written(), 0);
    }

    #[test]
    fn test_recording() {
        let metrics = Metrics::new().unwrap();
        metrics.connection_accepted();
        metrics.connection_accepted();
        metrics.connection_closed();
        metrics.sync_served();
        metrics.broadcast_sent();
        metrics.bytes_written(512);
        metrics.bytes_written(8);

        assert_eq!(metrics.connections_accepted(), 2);
        assert_eq!(metrics.connections_closed(), 1);
        assert_eq!(metrics.sync_requests(), 1);
        assert_eq!(metrics.broadcasts(), 1);
        assert_eq!(metrics.total_bytes_written(), 520);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new().unwrap();
        metrics.sync_served();
        metrics.set_registry_handles(3);

        let output = metrics.export_prometheus();
        assert!(output.contains("syncfeed_sync_requests_total 1"));
        assert!(output.contains("syncfeed_registry_handles 3"));
        assert!(output.contains("syncfeed_connections_accepted_total 0"));
    }
}
