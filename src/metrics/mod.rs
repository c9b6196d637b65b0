//! Metrics Module
//! 
//! Handles metrics collection and export.

pub mod collector;
pub mod server;

pub use collector::Metrics;
pub use server::MetricsServer;
