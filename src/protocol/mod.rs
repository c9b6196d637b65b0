//! Control Protocol
//!
//! Detection of the `sync` control record and the snapshot payloads sent in
//! reply to it.

pub mod constants;
pub mod snapshot;
pub mod sync;

pub use constants::*;
pub use snapshot::{FixedSnapshotProvider, SnapshotProvider};
pub use sync::is_sync_request;
