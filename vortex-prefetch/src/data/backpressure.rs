//! Backpressure control for the prefetch queue
//!
//! Bounds the number of batches buffered between producer and consumer.
//! A producer holds a permit for every batch it has built but the consumer
//! has not yet taken, so buffered batches never exceed the capacity.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Semaphore-based bound on pending batches
#[derive(Clone)]
pub struct BackpressureController {
    /// Semaphore to limit pending batches
    semaphore: Arc<Semaphore>,
    /// Maximum number of pending batches
    capacity: usize,
    /// Current pending count
    pending: Arc<AtomicUsize>,
    /// Largest pending count observed
    high_water: Arc<AtomicUsize>,
}

impl BackpressureController {
    /// Create a controller allowing `capacity` pending batches
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            pending: Arc::new(AtomicUsize::new(0)),
            high_water: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Acquire a slot for one batch (called by the producer).
    ///
    /// Waits while the queue is full. Returns `None` once the controller
    /// has been closed, including for producers already waiting.
    pub async fn acquire(&self) -> Option<BackpressurePermit> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;
        Some(self.track(permit))
    }

    /// Try to acquire without waiting
    pub fn try_acquire(&self) -> Option<BackpressurePermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| self.track(permit))
    }

    fn track(&self, permit: tokio::sync::OwnedSemaphorePermit) -> BackpressurePermit {
        let pending = self.pending.fetch_add(1, Ordering::AcqRel) + 1;
        self.high_water.fetch_max(pending, Ordering::AcqRel);
        BackpressurePermit {
            _permit: permit,
            pending: self.pending.clone(),
        }
    }

    /// Release every waiting producer and refuse further permits
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Whether the controller has been closed
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Get current pending count
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Largest pending count seen since creation
    pub fn high_water_mark(&self) -> usize {
        self.high_water.load(Ordering::Acquire)
    }

    /// Maximum number of pending batches
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Permit that tracks one pending batch
pub struct BackpressurePermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
    pending: Arc<AtomicUsize>,
}

impl Drop for BackpressurePermit {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backpressure_acquire() {
        let controller = BackpressureController::new(2);

        // Acquire two permits
        let p1 = controller.acquire().await.unwrap();
        let _p2 = controller.acquire().await.unwrap();
        assert_eq!(controller.pending_count(), 2);

        // Third acquire would block, so try_acquire should fail
        assert!(controller.try_acquire().is_none());

        // Drop one permit
        drop(p1);
        assert_eq!(controller.pending_count(), 1);

        // Now we can acquire
        let _p3 = controller.acquire().await.unwrap();
        assert_eq!(controller.pending_count(), 2);
        assert_eq!(controller.high_water_mark(), 2);
    }

    #[tokio::test]
    async fn test_close_releases_waiter() {
        let controller = BackpressureController::new(1);
        let _held = controller.acquire().await.unwrap();

        let waiter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.acquire().await.is_none() })
        };

        tokio::task::yield_now().await;
        controller.close();

        assert!(waiter.await.unwrap());
        assert!(controller.is_closed());
    }
}
