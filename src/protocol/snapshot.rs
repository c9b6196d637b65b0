//! Snapshot Provider
//!
//! The snapshot sent in reply to a sync request is four opaque segments
//! concatenated without delimiter or length prefix: executions, orders,
//! positions and the sync-done marker, in that order.

use bytes::{Bytes, BytesMut};

use super::constants::*;
use crate::config::SnapshotConfig;

/// Source of the four snapshot segments.
///
/// Called synchronously on the requesting connection's own task, so
/// implementations should return promptly.
pub trait SnapshotProvider: Send + Sync {
    /// Execution records
    fn executions(&self) -> Bytes;

    /// Open orders
    fn orders(&self) -> Bytes;

    /// Current positions
    fn positions(&self) -> Bytes;

    /// Marker telling the client the snapshot is complete
    fn sync_done(&self) -> Bytes;

    /// Assemble the full sync response in the fixed segment order.
    fn snapshot(&self) -> Bytes {
        let segments = [
            self.executions(),
            self.orders(),
            self.positions(),
            self.sync_done(),
        ];
        let total = segments.iter().map(Bytes::len).sum();

        let mut out = BytesMut::with_capacity(total);
        for segment in &segments {
            out.extend_from_slice(segment);
        }
        out.freeze()
    }
}

/// Stub provider producing fixed-size segments filled with a marker byte.
#[derive(Debug, Clone)]
pub struct FixedSnapshotProvider {
    executions: Bytes,
    orders: Bytes,
    positions: Bytes,
    sync_done: Bytes,
}

impl FixedSnapshotProvider {
    /// Create a provider with the given segment sizes
    pub fn new(
        execution_bytes: usize,
        orders_bytes: usize,
        positions_bytes: usize,
        sync_done_bytes: usize,
    ) -> Self {
        Self {
            executions: filled(EXECUTION_FILL, execution_bytes),
            orders: filled(ORDERS_FILL, orders_bytes),
            positions: filled(POSITIONS_FILL, positions_bytes),
            sync_done: filled(SYNC_DONE_FILL, sync_done_bytes),
        }
    }

    /// Create a provider from configuration
    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self::new(
            config.execution_bytes,
            config.orders_bytes,
            config.positions_bytes,
            config.sync_done_bytes,
        )
    }

    /// Total length of the assembled snapshot
    pub fn total_len(&self) -> usize {
        self.executions.len() + self.orders.len() + self.positions.len() + self.sync_done.len()
    }
}

impl Default for FixedSnapshotProvider {
    fn default() -> Self {
        Self::new(
            DEFAULT_EXECUTION_BYTES,
            DEFAULT_ORDERS_BYTES,
            DEFAULT_POSITIONS_BYTES,
            DEFAULT_SYNC_DONE_BYTES,
        )
    }
}

impl SnapshotProvider for FixedSnapshotProvider {
    fn executions(&self) -> Bytes {
        self.executions.clone()
    }

    fn orders(&self) -> Bytes {
        self.orders.clone()
    }

    fn positions(&self) -> Bytes {
        self.positions.clone()
    }

    fn sync_done(&self) -> Bytes {
        self.sync_done.clone()
    }
}

fn filled(byte: u8, len: usize) -> Bytes {
    Bytes::from(vec![byte; len])
}
