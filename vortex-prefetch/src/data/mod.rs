//! Data feeding pipeline
//!
//! Bounded prefetching with backpressure, and the eager alternative.

pub mod backpressure;
pub mod batch;
pub mod cursor;
pub mod dataset;
pub mod eager;
pub mod prefetcher;
pub mod preprocess;
pub mod queue;
pub mod source;

pub use backpressure::{BackpressureController, BackpressurePermit};
pub use batch::{Batch, Feed};
pub use cursor::BatchCursor;
pub use dataset::{DataSplits, Dataset, InMemoryDataset, Label, Sample, Split};
pub use eager::{EagerDataset, EagerSplits};
pub use prefetcher::{Prefetcher, QueueConfig};
pub use preprocess::{Identity, Preprocess};
pub use queue::{PrefetchQueue, QueueStats, QueueStatus};
pub use source::BatchSource;
