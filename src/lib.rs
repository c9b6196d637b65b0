//! Syncfeed Library
//! 
//! A TCP server that answers `sync` requests with a bulk snapshot and fans
//! broadcast payloads out to every live client connection.
//!
//! Each connection runs on its own task with an ordered, single-writer
//! outgoing queue. The [`ConnectionManager`] tracks connections through
//! handles that never keep them alive; expired entries are reclaimed by
//! periodic garbage collection.

pub mod config;
pub mod connection;
pub mod heartbeat;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod shutdown;

pub use config::Config;
pub use connection::{Connection, ConnectionHandle, ConnectionId, ConnectionManager};
pub use heartbeat::Heartbeat;
pub use protocol::{FixedSnapshotProvider, SnapshotProvider};
pub use server::{Server, ServerHandle};
pub use shutdown::{ShutdownCoordinator, ShutdownSignals};

/// Common error type for the server
pub type Result<T> = anyhow::Result<T>;
