//! Unix signal handling for graceful shutdown.
//!
//! SIGTERM and SIGINT both trigger shutdown; the daemon's listeners each
//! subscribe to the same watch channel and drain when it fires.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// A subscription to the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits until shutdown is requested. Returns immediately if it
    /// already was.
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
        // Sender dropped: treat as shutdown so tasks can drain.
    }
}

/// Installs the process signal listener and hands out shutdown
/// subscriptions.
pub struct SignalHandler {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    /// Creates a new signal handler.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Returns a new shutdown subscription.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }

    /// Requests shutdown programmatically (used by tests).
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Spawns the signal listener task. Call once at startup.
    #[cfg(unix)]
    pub fn spawn_listener(&self) {
        let tx = self.tx.clone();

        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("received SIGINT, shutting down"),
            }
            let _ = tx.send(true);
        });
    }

    /// No-op on non-Unix platforms.
    #[cfg(not(unix))]
    pub fn spawn_listener(&self) {}
}
