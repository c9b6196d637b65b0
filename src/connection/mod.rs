//! Connection Management Module
//! 
//! Per-connection pipelines and the registry that tracks them.

pub mod manager;
pub mod pipeline;
pub mod queue;

pub use manager::{ConnectionId, ConnectionManager};
pub use pipeline::{Connection, ConnectionContext, ConnectionHandle};
pub use queue::WriteQueue;
