//! Batch source shared by both feeding modes
//!
//! The orchestrator asks one `BatchSource` per split for batches and does
//! not care whether they come from a background producer or from an
//! eagerly preprocessed dataset.

use super::batch::Batch;
use super::eager::EagerDataset;
use super::queue::PrefetchQueue;
use crate::error::Result;

/// Where a phase draws its batches from
pub enum BatchSource<'a, E> {
    /// Background producer behind a bounded queue
    Streaming(PrefetchQueue<E>),
    /// Dataset preprocessed at startup
    Eager {
        dataset: &'a mut EagerDataset<E>,
        shuffle: bool,
    },
}

impl<'a, E: Clone + Send + 'static> BatchSource<'a, E> {
    /// Next batch of `batch_size` examples
    pub async fn next_batch(&mut self, batch_size: usize) -> Result<Batch<E>> {
        match self {
            BatchSource::Streaming(queue) => queue.dequeue().await,
            BatchSource::Eager { dataset, shuffle } => dataset.next_batch(batch_size, *shuffle),
        }
    }

    /// Whether preprocessing happens concurrently with the consumer
    pub fn is_streaming(&self) -> bool {
        matches!(self, BatchSource::Streaming(_))
    }

    /// Release the source. Streaming queues are closed and their producer
    /// awaited; eager datasets need no cleanup.
    pub async fn release(self) {
        if let BatchSource::Streaming(queue) = self {
            queue.shutdown().await;
        }
    }
}
