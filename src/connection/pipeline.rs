//! Connection Pipeline
//!
//! Every accepted stream is driven by its own task. That task is the
//! connection's serialized context: the read loop, the write loop and every
//! `write`/`stop` request arriving through a [`ConnectionHandle`] run on it one
//! at a time, in the order they were scheduled.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::queue::WriteQueue;
use crate::metrics::Metrics;
use crate::protocol::{is_sync_request, SnapshotProvider};

/// Requests marshaled onto a connection's task
#[derive(Debug)]
enum Command {
    Write(Bytes),
    Stop,
}

/// Why a pipeline stopped running
#[derive(Debug)]
enum Halt {
    /// Read loop halted and the write queue emptied
    Drained,
    /// `stop()` cancelled all pending I/O
    Stopped,
    WriteFailed(io::Error),
}

/// Collaborators shared by every connection
#[derive(Clone)]
pub struct ConnectionContext {
    pub provider: Arc<dyn SnapshotProvider>,
    pub metrics: Arc<Metrics>,
    /// Capacity of the receive buffer, reused for every read
    pub buffer_size: usize,
}

impl ConnectionContext {
    pub fn new(provider: Arc<dyn SnapshotProvider>, metrics: Arc<Metrics>, buffer_size: usize) -> Self {
        Self {
            provider,
            metrics,
            buffer_size,
        }
    }
}

/// Non-owning handle to a connection.
///
/// Holding a handle never keeps the connection running; once its pipeline
/// halts the handle is expired and every call on it is a silent no-op.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    peer: SocketAddr,
    mailbox: mpsc::UnboundedSender<Command>,
}

impl ConnectionHandle {
    /// Queue `bytes` as one entry at the tail of the outgoing queue.
    ///
    /// Returns immediately; transmission happens on the connection's task.
    pub fn write(&self, bytes: impl Into<Bytes>) {
        let _ = self.mailbox.send(Command::Write(bytes.into()));
    }

    /// Cancel all pending I/O on the connection. Idempotent.
    pub fn stop(&self) {
        let _ = self.mailbox.send(Command::Stop);
    }

    /// True once the connection's pipeline has halted
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Wait for the connection's pipeline to halt
    pub async fn closed(&self) {
        self.mailbox.closed().await
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

/// One client's duplex byte stream, not yet started
pub struct Connection<S> {
    stream: S,
    peer: SocketAddr,
    ctx: ConnectionContext,
    mailbox: mpsc::UnboundedReceiver<Command>,
    handle: ConnectionHandle,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an accepted stream
    pub fn new(stream: S, peer: SocketAddr, ctx: ConnectionContext) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            stream,
            peer,
            ctx,
            mailbox: rx,
            handle: ConnectionHandle { peer, mailbox: tx },
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Spawn the connection's task, beginning with the read loop
    pub fn start(self) -> ConnectionHandle {
        let handle = self.handle();
        tokio::spawn(self.run());
        handle
    }

    #[instrument(name = "connection", skip_all, fields(peer = %self.peer))]
    async fn run(self) {
        let Connection { stream, ctx, mut mailbox, handle, .. } = self;
        drop(handle);

        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut incoming = vec![0u8; ctx.buffer_size];
        let mut outgoing = WriteQueue::new();
        let mut reading = true;
        let mut mailbox_open = true;

        debug!("Connection started");

        let halt = loop {
            if !reading && outgoing.is_empty() {
                // Writes already handed over still go out after the read loop halts
                match mailbox.try_recv() {
                    Ok(Command::Write(bytes)) => {
                        outgoing.push(bytes);
                        continue;
                    }
                    Ok(Command::Stop) => break Halt::Stopped,
                    Err(_) => break Halt::Drained,
                }
            }

            // read and write are both cancel safe: a losing branch transfers nothing
            tokio::select! {
                command = mailbox.recv(), if mailbox_open => match command {
                    Some(Command::Write(bytes)) => outgoing.push(bytes),
                    Some(Command::Stop) => break Halt::Stopped,
                    None => mailbox_open = false,
                },
                result = reader.read(&mut incoming), if reading => match result {
                    Ok(0) => {
                        info!("Read loop terminating: peer closed the stream");
                        reading = false;
                    }
                    Ok(n) => {
                        if is_sync_request(&incoming[..n]) {
                            let snapshot = ctx.provider.snapshot();
                            info!(bytes = snapshot.len(), "Sync detected, queueing snapshot");
                            ctx.metrics.sync_served();
                            outgoing.push(snapshot);
                        }
                    }
                    Err(e) => {
                        info!(error = %e, "Read loop terminating");
                        reading = false;
                    }
                },
                result = writer.write(outgoing.pending().unwrap_or_default()), if !outgoing.is_empty() => match result {
                    Ok(0) => break Halt::WriteFailed(io::ErrorKind::WriteZero.into()),
                    Ok(n) => {
                        if let Some(len) = outgoing.advance(n) {
                            debug!(bytes = len, queued = outgoing.len(), "Write completed");
                            ctx.metrics.bytes_written(len);
                        }
                    }
                    Err(e) => break Halt::WriteFailed(e),
                },
            }
        };

        match halt {
            Halt::Drained => debug!("Connection drained"),
            Halt::Stopped => info!(discarded = outgoing.len(), "Connection stopped, pending I/O cancelled"),
            Halt::WriteFailed(e) => warn!(error = %e, discarded = outgoing.len(), "Write failed, cancelling connection"),
        }
        ctx.metrics.connection_closed();
    }
}
