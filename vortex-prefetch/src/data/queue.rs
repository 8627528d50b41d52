//! Bounded prefetch queue
//!
//! Consumer side of the pipeline. Spawns a producer on construction and
//! hands out finished batches in production order. Closing the queue
//! releases the producer whether it is preprocessing, waiting for a free
//! slot or sending, and frees every buffered batch.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::backpressure::BackpressureController;
use super::batch::Batch;
use super::dataset::{Dataset, Split};
use super::prefetcher::{Message, Prefetcher, QueueConfig};
use super::preprocess::Preprocess;
use crate::error::{Result, TrainerError};
use crate::metrics::standard;

/// Live counters shared between a queue, its producer and observers
pub struct QueueStatus {
    split: Split,
    backpressure: BackpressureController,
    produced: AtomicU64,
    consumed: AtomicU64,
    closed: AtomicBool,
    producer_running: AtomicBool,
}

impl QueueStatus {
    fn new(split: Split, backpressure: BackpressureController) -> Self {
        Self {
            split,
            backpressure,
            produced: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            producer_running: AtomicBool::new(false),
        }
    }

    pub(crate) fn record_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_producer_running(&self, running: bool) {
        self.producer_running.store(running, Ordering::Release);
    }

    /// Split this queue serves
    pub fn split(&self) -> Split {
        self.split
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether the producer task is still alive
    pub fn is_producer_running(&self) -> bool {
        self.producer_running.load(Ordering::Acquire)
    }

    /// Batches currently buffered or being handed over
    pub fn pending(&self) -> usize {
        self.backpressure.pending_count()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            split: self.split,
            capacity: self.backpressure.capacity(),
            batches_produced: self.produced.load(Ordering::Relaxed),
            batches_consumed: self.consumed.load(Ordering::Relaxed),
            pending: self.backpressure.pending_count(),
            high_water_mark: self.backpressure.high_water_mark(),
            closed: self.is_closed(),
            producer_running: self.is_producer_running(),
        }
    }
}

/// Point-in-time view of a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub split: Split,
    pub capacity: usize,
    pub batches_produced: u64,
    pub batches_consumed: u64,
    pub pending: usize,
    pub high_water_mark: usize,
    pub closed: bool,
    pub producer_running: bool,
}

/// Capacity-bounded FIFO of preprocessed batches fed by a background producer
pub struct PrefetchQueue<E> {
    split: Split,
    receiver: mpsc::Receiver<Message<E>>,
    backpressure: BackpressureController,
    status: Arc<QueueStatus>,
    producer: Option<JoinHandle<()>>,
    /// Producer failure already handed to the consumer
    failure_reported: bool,
}

impl<E: Send + 'static> PrefetchQueue<E> {
    /// Create the queue and start producing on `handle` immediately
    pub fn spawn<D, P>(
        handle: &Handle,
        split: Split,
        dataset: Arc<D>,
        preprocess: Arc<P>,
        config: QueueConfig,
    ) -> Result<Self>
    where
        D: Dataset<Example = E>,
        P: Preprocess<E>,
    {
        if config.batch_size == 0 || config.capacity == 0 {
            return Err(TrainerError::InvalidConfig {
                reason: format!(
                    "queue needs a non-zero batch size and capacity, got {} and {}",
                    config.batch_size, config.capacity
                ),
            });
        }

        let (sender, receiver) = mpsc::channel(config.capacity);
        let backpressure = BackpressureController::new(config.capacity);
        let status = Arc::new(QueueStatus::new(split, backpressure.clone()));

        debug!(
            %split,
            num_examples = dataset.num_examples(),
            shuffle = config.shuffle,
            "Opening prefetch queue"
        );

        let prefetcher = Prefetcher::new(
            split,
            dataset,
            preprocess,
            sender,
            backpressure.clone(),
            config,
            status.clone(),
        );
        let producer = handle.spawn(prefetcher.run());

        Ok(Self {
            split,
            receiver,
            backpressure,
            status,
            producer: Some(producer),
            failure_reported: false,
        })
    }

    /// Take the next batch, waiting while the queue is empty.
    ///
    /// A failure inside the producer surfaces here as `ProducerFailed`.
    pub async fn dequeue(&mut self) -> Result<Batch<E>> {
        if self.status.is_closed() {
            return Err(TrainerError::QueueClosed { split: self.split });
        }

        let start = Instant::now();
        match self.receiver.recv().await {
            Some(Message::Batch(batch, permit)) => {
                drop(permit);
                self.status.consumed.fetch_add(1, Ordering::Relaxed);
                standard::BATCHES_DEQUEUED.inc();
                standard::DEQUEUE_WAIT.observe_duration(start.elapsed());
                Ok(batch)
            }
            Some(Message::Failed(source)) => {
                self.failure_reported = true;
                Err(TrainerError::ProducerFailed {
                    split: self.split,
                    source: Box::new(source),
                })
            }
            // The producer only stops on its own after reporting a failure
            None if !self.failure_reported && !self.status.is_closed() => {
                self.failure_reported = true;
                Err(TrainerError::ProducerFailed {
                    split: self.split,
                    source: Box::new(TrainerError::Internal {
                        message: "producer exited unexpectedly".into(),
                    }),
                })
            }
            None => Err(TrainerError::QueueClosed { split: self.split }),
        }
    }
}

impl<E> PrefetchQueue<E> {
    /// Stop the producer and free buffered batches.
    ///
    /// Idempotent, and safe whether the producer is running, blocked on a
    /// full queue, finished or failed.
    pub fn close(&mut self) {
        if self.status.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.backpressure.close();
        self.receiver.close();
        let mut dropped = 0usize;
        while self.receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if let Some(producer) = &self.producer {
            producer.abort();
        }

        debug!(
            split = %self.split,
            dropped_batches = dropped,
            "Prefetch queue closed"
        );
    }

    /// Close the queue and wait for the producer task to exit
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(producer) = self.producer.take() {
            if let Err(e) = producer.await {
                if e.is_panic() {
                    warn!(split = %self.split, "Producer panicked: {}", e);
                }
            }
        }
    }

    /// Whether the queue has been closed
    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    /// Split this queue serves
    pub fn split(&self) -> Split {
        self.split
    }

    /// Shared status handle, usable after the queue is gone
    pub fn status(&self) -> Arc<QueueStatus> {
        self.status.clone()
    }
}

impl<E> Drop for PrefetchQueue<E> {
    fn drop(&mut self) {
        self.close();
    }
}
