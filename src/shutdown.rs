//! Graceful Shutdown Handling
//! 
//! Listens for process termination signals (SIGINT, SIGTERM, SIGQUIT) and
//! notifies subscribers so the accept loop can halt and stop every connection.

use tokio::sync::broadcast;
use tokio::signal;
use tracing::{info, warn};
use crate::Result;

/// Shutdown coordinator that fans a termination signal out to subscribers
pub struct ShutdownCoordinator {
    /// Broadcast sender for shutdown signal
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Notify all subscribers without waiting for a signal
    pub fn trigger(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal: {}", e);
        }
    }

    /// Wait for SIGINT, SIGTERM or SIGQUIT, then notify subscribers
    pub async fn listen_for_signals(&self) -> Result<()> {
        let signals = ShutdownSignals::register()?;
        self.listen_on(signals).await
    }

    /// Wait on already registered handlers, then notify subscribers
    pub async fn listen_on(&self, mut signals: ShutdownSignals) -> Result<()> {
        info!("Starting shutdown signal listener");
        signals.recv().await?;
        self.trigger();
        Ok(())
    }
}

/// Registered termination signal handlers
pub struct ShutdownSignals {
    #[cfg(unix)]
    sigterm: signal::unix::Signal,
    #[cfg(unix)]
    sigint: signal::unix::Signal,
    #[cfg(unix)]
    sigquit: signal::unix::Signal,
}

impl ShutdownSignals {
    /// Install the handlers; fails if the runtime cannot watch a signal
    pub fn register() -> Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                sigterm: signal::unix::signal(signal::unix::SignalKind::terminate())?,
                sigint: signal::unix::signal(signal::unix::SignalKind::interrupt())?,
                sigquit: signal::unix::signal(signal::unix::SignalKind::quit())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Resolve on the first termination signal
    pub async fn recv(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.sigterm.recv() => {
                    info!("Received SIGTERM, initiating shutdown");
                }
                _ = self.sigint.recv() => {
                    info!("Received SIGINT, initiating shutdown");
                }
                _ = self.sigquit.recv() => {
                    info!("Received SIGQUIT, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating shutdown");
        }

        Ok(())
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn test_shutdown_signal_broadcast() {
        let coordinator = ShutdownCoordinator::new();
        let mut first = coordinator.subscribe();
        let mut second = coordinator.subscribe();
        
        coordinator.trigger();
        
        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_trigger_wakes_waiting_task() {
        let coordinator = ShutdownCoordinator::new();
        let mut receiver = coordinator.subscribe();

        let waiter = tokio::spawn(async move { receiver.recv().await.is_ok() });

        sleep(Duration::from_millis(20)).await;
        coordinator.trigger();

        let woke = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(woke);
    }

    #[tokio::test]
    async fn test_register_signal_handlers() {
        assert!(ShutdownSignals::register().is_ok());
    }

    #[tokio::test]
    async fn test_trigger_without_subscribers() {
        // Logged, not an error
        ShutdownCoordinator::new().trigger();
    }
}
