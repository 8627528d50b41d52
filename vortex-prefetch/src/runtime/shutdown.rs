//! Interruption handling
//!
//! Broadcast-based signal that a user interruption arrived. The signal
//! is latched, so a phase that starts listening after the interruption
//! still observes it, and it is reset at each phase boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Interruption signal broadcaster
///
/// Clones share the same underlying signal.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: Arc<broadcast::Sender<()>>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender: Arc::new(sender),
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Trigger the signal
    pub fn shutdown(&self) {
        self.triggered.store(true, Ordering::Release);
        let _ = self.sender.send(());
    }

    /// Whether the signal fired since the last reset
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Clear the latch before the next phase
    pub fn reset(&self) {
        self.triggered.store(false, Ordering::Release);
    }

    /// Create a new receiver for this signal
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn wait(&self) {
        let mut receiver = self.subscribe();
        if self.is_triggered() {
            return;
        }
        loop {
            match receiver.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
                Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
            }
        }
    }

    /// Trigger the signal on every Ctrl-C until the runtime shuts down
    pub fn listen_for_ctrl_c(&self, handle: &Handle) -> JoinHandle<()> {
        let signal = self.clone();
        handle.spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                info!("Interrupt received");
                signal.shutdown();
            }
        })
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();

        // Spawn task waiting for shutdown
        let handle = tokio::spawn(async move {
            waiter.wait().await;
            42
        });

        tokio::task::yield_now().await;
        signal.shutdown();

        let result = handle.await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn test_latched_until_reset() {
        let signal = ShutdownSignal::new();
        signal.shutdown();

        // Late listener still sees it
        signal.wait().await;
        assert!(signal.is_triggered());

        signal.reset();
        assert!(!signal.is_triggered());
        let pending =
            tokio::time::timeout(std::time::Duration::from_millis(20), signal.wait()).await;
        assert!(pending.is_err());
    }
}
