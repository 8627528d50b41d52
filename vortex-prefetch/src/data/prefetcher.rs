//! Background batch producer
//!
//! Runs as a task on the prefetch runtime, drawing raw examples through a
//! cursor, preprocessing them and pushing finished batches into the
//! bounded queue ahead of consumption.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::backpressure::{BackpressureController, BackpressurePermit};
use super::batch::Batch;
use super::cursor::BatchCursor;
use super::dataset::{Dataset, Split};
use super::preprocess::Preprocess;
use super::queue::QueueStatus;
use crate::error::{Result, TrainerError};
use crate::metrics::standard;

/// Configuration for one prefetch queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Examples per batch
    pub batch_size: usize,
    /// Maximum number of buffered batches
    pub capacity: usize,
    /// Draw examples in shuffled order each pass
    pub shuffle: bool,
    /// Seed for the shuffling order
    pub seed: u64,
}

/// Item travelling from producer to consumer
pub(crate) enum Message<E> {
    /// Finished batch with the slot it occupies
    Batch(Batch<E>, BackpressurePermit),
    /// Producer stopped on an error
    Failed(TrainerError),
}

/// Producer that preprocesses batches ahead of the training loop
pub struct Prefetcher<D: Dataset, P> {
    split: Split,
    dataset: Arc<D>,
    preprocess: Arc<P>,
    sender: mpsc::Sender<Message<D::Example>>,
    backpressure: BackpressureController,
    cursor: BatchCursor,
    config: QueueConfig,
    status: Arc<QueueStatus>,
}

impl<D, P> Prefetcher<D, P>
where
    D: Dataset,
    P: Preprocess<D::Example>,
{
    pub(crate) fn new(
        split: Split,
        dataset: Arc<D>,
        preprocess: Arc<P>,
        sender: mpsc::Sender<Message<D::Example>>,
        backpressure: BackpressureController,
        config: QueueConfig,
        status: Arc<QueueStatus>,
    ) -> Self {
        let cursor = BatchCursor::new(dataset.num_examples(), config.seed);
        Self {
            split,
            dataset,
            preprocess,
            sender,
            backpressure,
            cursor,
            config,
            status,
        }
    }

    /// Run the producer loop until the queue is closed or a batch fails
    pub async fn run(mut self) {
        let _running = RunningGuard::new(self.status.clone());
        debug!(
            split = %self.split,
            batch_size = self.config.batch_size,
            capacity = self.config.capacity,
            "Producer starting"
        );

        loop {
            // Blocks while the queue is full
            let Some(permit) = self.backpressure.acquire().await else {
                debug!(split = %self.split, "Producer: queue closed, stopping");
                break;
            };

            // Panics in the transform are reported like errors
            let built = panic::catch_unwind(AssertUnwindSafe(|| self.build_batch()))
                .unwrap_or_else(|payload| {
                    Err(TrainerError::Internal {
                        message: format!("preprocessing panicked: {}", panic_message(&*payload)),
                    })
                });

            match built {
                Ok(batch) => {
                    self.status.record_produced();
                    standard::BATCHES_PREPROCESSED.inc();
                    if self.sender.send(Message::Batch(batch, permit)).await.is_err() {
                        debug!(split = %self.split, "Producer: consumer dropped, stopping");
                        break;
                    }
                }
                Err(e) => {
                    warn!(split = %self.split, "Producer failed: {}", e);
                    let _ = self.sender.send(Message::Failed(e)).await;
                    drop(permit);
                    break;
                }
            }
        }
    }

    /// Draw, preprocess and assemble one full batch
    fn build_batch(&mut self) -> Result<Batch<D::Example>> {
        let indices = self
            .cursor
            .next_indices(self.config.batch_size, self.config.shuffle)?;

        let mut batch = Batch::with_capacity(indices.len());
        for index in indices {
            let mut sample = self.dataset.get(index)?;
            sample.example = self.preprocess.preprocess(sample.example)?;
            batch.push(sample);
        }
        standard::EXAMPLES_PREPROCESSED.inc_by(batch.len() as u64);

        Ok(batch)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Marks the producer as running for as long as its task is alive,
/// including when the task is aborted mid-await.
struct RunningGuard {
    status: Arc<QueueStatus>,
}

impl RunningGuard {
    fn new(status: Arc<QueueStatus>) -> Self {
        status.set_producer_running(true);
        standard::ACTIVE_PRODUCERS.inc();
        Self { status }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.status.set_producer_running(false);
        standard::ACTIVE_PRODUCERS.dec();
    }
}
