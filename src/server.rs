//! Server
//!
//! Owns the listening socket and the connection registry. A single task runs
//! the accept loop, applies broadcasts handed in through [`ServerHandle`],
//! drives periodic garbage collection of the registry and, on shutdown, stops
//! every connection and waits for them to close.
//!
//! Idle or stalled peers are never timed out: a connection that neither
//! errors nor is stopped keeps its resources until shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use bytes::Bytes;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::connection::{Connection, ConnectionContext, ConnectionManager};
use crate::metrics::Metrics;
use crate::protocol::SnapshotProvider;
use crate::shutdown::{ShutdownCoordinator, ShutdownSignals};
use crate::Result;

/// Poll period while waiting for stopped connections to close
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Requests handed to the server task from other threads
#[derive(Debug)]
enum Control {
    Broadcast(Bytes),
}

/// Cloneable entry point for pushing payloads to every connection
#[derive(Debug, Clone)]
pub struct ServerHandle {
    control: mpsc::UnboundedSender<Control>,
}

impl ServerHandle {
    /// Broadcast `bytes` to every live connection.
    ///
    /// Returns false without effect once the server has stopped. A true
    /// result only means the payload was handed to the server; delivery
    /// to each client remains best-effort.
    pub fn deliver(&self, bytes: impl Into<Bytes>) -> bool {
        self.control.send(Control::Broadcast(bytes.into())).is_ok()
    }

    pub fn is_stopped(&self) -> bool {
        self.control.is_closed()
    }
}

/// TCP server for sync and broadcast clients
pub struct Server {
    listener: TcpListener,
    manager: ConnectionManager,
    ctx: ConnectionContext,
    control_tx: mpsc::UnboundedSender<Control>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    gc_interval: Duration,
    shutdown_timeout: Duration,
}

impl Server {
    /// Bind the listening socket with address reuse enabled
    pub async fn bind(
        config: &Config,
        provider: Arc<dyn SnapshotProvider>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        config.validate().context("Refusing to bind with an invalid configuration")?;

        let bind_addr = config.server.bind_addr;
        info!("Binding TCP listener to {}", bind_addr);

        let socket = if bind_addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .context("Failed to create listening socket")?;
        socket.set_reuseaddr(true).context("Failed to set SO_REUSEADDR")?;
        socket
            .bind(bind_addr)
            .with_context(|| format!("Failed to bind {}", bind_addr))?;
        let listener = socket
            .listen(config.server.listen_backlog)
            .with_context(|| format!("Failed to listen on {}", bind_addr))?;

        info!("Successfully bound to {}", listener.local_addr()?);

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        Ok(Self {
            listener,
            manager: ConnectionManager::new(),
            ctx: ConnectionContext::new(provider, metrics, config.server.buffer_size),
            control_tx,
            control_rx,
            gc_interval: config.server.gc_interval,
            shutdown_timeout: config.server.shutdown_timeout,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for delivering broadcasts from any thread
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            control: self.control_tx.clone(),
        }
    }

    /// Run until SIGINT, SIGTERM or SIGQUIT is received
    pub async fn run(self) -> Result<()> {
        let signals = ShutdownSignals::register().context("Failed to set up signal handlers")?;
        let coordinator = ShutdownCoordinator::new();
        let shutdown_rx = coordinator.subscribe();

        let listener = tokio::spawn(async move { coordinator.listen_on(signals).await });
        self.run_until_notified(shutdown_rx, listener).await
    }

    /// Run until `shutdown_rx` fires. If the notifier goes away without
    /// firing, the listener's failure is returned after the drain.
    async fn run_until_notified(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
        listener: JoinHandle<Result<()>>,
    ) -> Result<()> {
        let mut listener_lost = false;
        let result = self
            .run_until(async {
                listener_lost = matches!(shutdown_rx.recv().await, Err(RecvError::Closed));
            })
            .await;

        if !listener_lost {
            listener.abort();
            return result;
        }
        result?;

        error!("Shutdown signal listener ended without a signal");
        match listener.await {
            Ok(Err(e)) => Err(e.context("Shutdown signal listener failed")),
            Ok(Ok(())) => Err(anyhow!("Shutdown signal listener exited without notifying")),
            Err(e) => Err(anyhow::Error::new(e).context("Shutdown signal listener panicked")),
        }
    }

    /// Run until `shutdown` completes or accepting fails.
    ///
    /// Either way every connection is stopped and the call returns once they
    /// have closed or the shutdown timeout has elapsed. An accept failure is
    /// returned as the error; it is never retried.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            mut manager,
            ctx,
            control_tx,
            mut control_rx,
            gc_interval,
            shutdown_timeout,
        } = self;
        drop(control_tx);
        tokio::pin!(shutdown);

        let mut gc_timer = tokio::time::interval_at(tokio::time::Instant::now() + gc_interval, gc_interval);
        gc_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Starting connection acceptance loop");

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping connection acceptance");
                    break Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => accept_connection(&mut manager, &ctx, stream, peer),
                    Err(e) => {
                        error!(error = %e, "Accept failed, halting connection acceptance");
                        break Err(anyhow::Error::new(e).context("Accept loop failed"));
                    }
                },
                Some(control) = control_rx.recv() => match control {
                    Control::Broadcast(bytes) => {
                        ctx.metrics.broadcast_sent();
                        manager.broadcast(bytes);
                    }
                },
                _ = gc_timer.tick() => {
                    let remaining = manager.garbage_collect();
                    ctx.metrics.set_registry_handles(remaining);
                    debug!(remaining, "Periodic garbage collection");
                }
            }
        };

        drop(listener);
        control_rx.close();
        drain(&mut manager, &ctx, shutdown_timeout).await;

        info!("Connection acceptance loop stopped");
        result
    }
}

fn accept_connection(
    manager: &mut ConnectionManager,
    ctx: &ConnectionContext,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let connection = Connection::new(stream, peer, ctx.clone());
    let id = manager.register_and_start(connection);
    ctx.metrics.connection_accepted();
    info!(connection_id = %id, peer = %peer, "Accepted connection");
}

/// Stop every connection and wait for the registry to empty
async fn drain(manager: &mut ConnectionManager, ctx: &ConnectionContext, shutdown_timeout: Duration) {
    manager.stop_all();

    let start_time = Instant::now();
    let mut remaining = manager.garbage_collect();
    info!("Waiting for {} connections to close (timeout: {:?})", remaining, shutdown_timeout);

    while remaining > 0 && start_time.elapsed() < shutdown_timeout {
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        remaining = manager.garbage_collect();
    }
    ctx.metrics.set_registry_handles(remaining);

    let elapsed = start_time.elapsed();
    if remaining == 0 {
        info!("All connections closed in {:?}", elapsed);
    } else {
        warn!("Shutdown timeout reached after {:?} with {} connections still open", elapsed, remaining);
    }
}
