//! Connection Manager Implementation
//!
//! The registry is a generational handle table. Entries never keep a
//! connection alive: an entry whose pipeline has halted is "expired" and stays
//! in the table until [`ConnectionManager::garbage_collect`] reclaims it.
//!
//! Only one task may own the manager (the accept loop); it holds no locks.

use std::fmt;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use super::{Connection, ConnectionHandle};

/// Registry key of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    index: u32,
    generation: u32,
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    handle: Option<ConnectionHandle>,
}

impl Slot {
    fn is_expired(&self) -> bool {
        self.handle.as_ref().map_or(false, ConnectionHandle::is_closed)
    }
}

/// Tracks every started connection without extending its lifetime
#[derive(Debug, Default)]
pub struct ConnectionManager {
    slots: Vec<Slot>,
    free: Vec<u32>,
    handles: usize,
}

impl ConnectionManager {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a handle for `connection`, then start it
    pub fn register_and_start<S>(&mut self, connection: Connection<S>) -> ConnectionId
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let peer = connection.peer_addr();
        let id = self.insert(connection.handle());
        connection.start();

        debug!(connection_id = %id, peer = %peer, handles = self.handles, "Registered connection");
        id
    }

    fn insert(&mut self, handle: ConnectionHandle) -> ConnectionId {
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].handle = Some(handle);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    handle: Some(handle),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.handles += 1;

        ConnectionId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Handle for `id` if the entry exists and its connection is still running
    fn live(&self, id: ConnectionId) -> Option<&ConnectionHandle> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.handle.as_ref().filter(|handle| !handle.is_closed())
    }

    fn live_handles(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.slots
            .iter()
            .filter_map(|slot| slot.handle.as_ref())
            .filter(|handle| !handle.is_closed())
    }

    /// Stop one connection. Its entry stays until garbage collection.
    pub fn stop(&self, id: ConnectionId) {
        match self.live(id) {
            Some(handle) => {
                debug!(connection_id = %id, peer = %handle.peer_addr(), "Stopping connection");
                handle.stop();
            }
            None => debug!(connection_id = %id, "Stop ignored, connection already gone"),
        }
    }

    /// Stop every live connection
    pub fn stop_all(&self) {
        let mut stopped = 0usize;
        for handle in self.live_handles() {
            handle.stop();
            stopped += 1;
        }
        info!(stopped, "Stopped all live connections");
    }

    /// Queue the same payload on every live connection.
    ///
    /// Best-effort: delivery is neither awaited nor reported.
    pub fn broadcast(&self, bytes: Bytes) {
        let mut recipients = 0usize;
        for handle in self.live_handles() {
            handle.write(bytes.clone());
            recipients += 1;
        }
        debug!(bytes = bytes.len(), recipients, "Broadcast queued");
    }

    /// Remove every expired entry; returns the number of entries remaining
    pub fn garbage_collect(&mut self) -> usize {
        let mut removed = 0usize;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_expired() {
                slot.handle = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                removed += 1;
            }
        }
        self.handles -= removed;

        if removed > 0 {
            debug!(removed, remaining = self.handles, "Garbage collected expired connections");
        }
        self.handles
    }

    /// Number of entries, expired or not
    pub fn len(&self) -> usize {
        self.handles
    }

    pub fn is_empty(&self) -> bool {
        self.handles == 0
    }

    /// True if `id` still has an entry, even an expired one
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.slots
            .get(id.index as usize)
            .map_or(false, |slot| slot.generation == id.generation && slot.handle.is_some())
    }

    /// True if `id` refers to a connection that is still running
    pub fn is_live(&self, id: ConnectionId) -> bool {
        self.live(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionContext;
    use crate::metrics::Metrics;
    use crate::protocol::FixedSnapshotProvider;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};
    use tokio::time::timeout;

    fn connection() -> (Connection<DuplexStream>, DuplexStream) {
        let (server, client) = tokio::io::duplex(4096);
        let ctx = ConnectionContext::new(
            Arc::new(FixedSnapshotProvider::default()),
            Arc::new(Metrics::new().unwrap()),
            1024,
        );
        (Connection::new(server, "127.0.0.1:40000".parse().unwrap(), ctx), client)
    }

    fn register(manager: &mut ConnectionManager) -> (ConnectionId, ConnectionHandle, DuplexStream) {
        let (conn, client) = connection();
        let handle = conn.handle();
        let id = manager.register_and_start(conn);
        (id, handle, client)
    }

    async fn wait_closed(handle: &ConnectionHandle) {
        timeout(Duration::from_secs(5), handle.closed())
            .await
            .expect("connection did not close");
    }

    async fn read_exactly(client: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        timeout(Duration::from_secs(5), client.read_exact(&mut buf))
            .await
            .expect("read timed out")
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_register_and_start() {
        let mut manager = ConnectionManager::new();
        assert!(manager.is_empty());

        let (id, handle, _client) = register(&mut manager);
        assert_eq!(manager.len(), 1);
        assert!(manager.contains(id));
        assert!(manager.is_live(id));
        assert!(!handle.is_closed());
    }

    #[tokio::test]
    async fn test_broadcast_fan_out() {
        let mut manager = ConnectionManager::new();
        let mut clients = Vec::new();
        for i in 0..3 {
            let (_id, handle, client) = register(&mut manager);
            handle.write(format!("prior-{}|", i));
            clients.push(client);
        }

        manager.broadcast(Bytes::from_static(b"M"));

        for (i, client) in clients.iter_mut().enumerate() {
            let expected = format!("prior-{}|M", i);
            let received = read_exactly(client, expected.len()).await;
            assert_eq!(received, expected.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_broadcast_skips_expired() {
        let mut manager = ConnectionManager::new();
        let (stopped_id, stopped, _stopped_client) = register(&mut manager);
        let (_id, _handle, mut client) = register(&mut manager);

        manager.stop(stopped_id);
        wait_closed(&stopped).await;

        manager.broadcast(Bytes::from_static(b"still here"));
        assert_eq!(read_exactly(&mut client, 10).await, b"still here");
    }

    #[tokio::test]
    async fn test_stop_keeps_entry_until_gc() {
        let mut manager = ConnectionManager::new();
        let (id, handle, _client) = register(&mut manager);

        manager.stop(id);
        manager.stop(id);
        wait_closed(&handle).await;

        assert!(manager.contains(id));
        assert!(!manager.is_live(id));
        assert_eq!(manager.len(), 1);

        assert_eq!(manager.garbage_collect(), 0);
        assert!(!manager.contains(id));
    }

    #[tokio::test]
    async fn test_garbage_collect_removes_destroyed_only() {
        let mut manager = ConnectionManager::new();
        let mut registered = Vec::new();
        for _ in 0..5 {
            registered.push(register(&mut manager));
        }

        // One stopped, one dropped by its peer
        let (stopped_id, stopped_handle, _) = &registered[1];
        manager.stop(*stopped_id);
        wait_closed(stopped_handle).await;

        let (_, peer_gone_handle, client) = registered.remove(3);
        drop(client);
        wait_closed(&peer_gone_handle).await;

        assert_eq!(manager.len(), 5);
        assert_eq!(manager.garbage_collect(), 3);
        assert_eq!(manager.garbage_collect(), 3);
        assert_eq!(manager.len(), 3);
    }

    #[tokio::test]
    async fn test_stale_id_is_noop_after_slot_reuse() {
        let mut manager = ConnectionManager::new();
        let (old_id, old_handle, _old_client) = register(&mut manager);
        manager.stop(old_id);
        wait_closed(&old_handle).await;
        manager.garbage_collect();

        let (new_id, new_handle, _new_client) = register(&mut manager);
        assert_ne!(old_id, new_id);
        assert!(!manager.contains(old_id));

        manager.stop(old_id);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(manager.is_live(new_id));
        assert!(!new_handle.is_closed());
    }

    #[tokio::test]
    async fn test_stop_all() {
        let mut manager = ConnectionManager::new();
        let handles: Vec<_> = (0..3).map(|_| register(&mut manager)).collect();

        manager.stop_all();
        for (_, handle, _) in &handles {
            wait_closed(handle).await;
        }

        assert_eq!(manager.garbage_collect(), 0);
        assert!(manager.is_empty());
    }
}
