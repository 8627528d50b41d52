//! Eagerly preprocessed dataset
//!
//! Applies the transform to every example once, up front, then serves
//! batches synchronously. Trades startup time and memory for zero
//! per-step preprocessing.

use std::time::Instant;
use tracing::info;

use super::batch::Batch;
use super::cursor::BatchCursor;
use super::dataset::{DataSplits, Dataset, Sample, Split};
use super::preprocess::Preprocess;
use crate::error::Result;

/// Fully preprocessed, in-memory copy of a dataset
#[derive(Debug)]
pub struct EagerDataset<E> {
    samples: Vec<Sample<E>>,
    cursor: BatchCursor,
}

impl<E: Clone> EagerDataset<E> {
    /// Preprocess every example of `dataset`. Blocks until done.
    pub fn build<D, P>(dataset: &D, preprocess: &P, seed: u64) -> Result<Self>
    where
        D: Dataset<Example = E>,
        P: Preprocess<E> + ?Sized,
    {
        let start = Instant::now();
        let num_examples = dataset.num_examples();

        let samples = (0..num_examples)
            .map(|index| {
                let sample = dataset.get(index)?;
                Ok(Sample::new(preprocess.preprocess(sample.example)?, sample.label))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            num_examples,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Preprocessed dataset"
        );

        Ok(Self {
            samples,
            cursor: BatchCursor::new(num_examples, seed),
        })
    }

    /// Next batch of exactly `batch_size` examples
    pub fn next_batch(&mut self, batch_size: usize, shuffle: bool) -> Result<Batch<E>> {
        let indices = self.cursor.next_indices(batch_size, shuffle)?;
        let mut batch = Batch::with_capacity(indices.len());
        for index in indices {
            batch.push(self.samples[index].clone());
        }
        Ok(batch)
    }

    /// Number of examples held
    pub fn num_examples(&self) -> usize {
        self.samples.len()
    }
}

/// Eagerly preprocessed train, validation and test splits
#[derive(Debug)]
pub struct EagerSplits<E> {
    pub train: EagerDataset<E>,
    pub val: EagerDataset<E>,
    pub test: EagerDataset<E>,
}

impl<E: Clone> EagerSplits<E> {
    /// Preprocess all three splits, each with its own shuffling seed
    pub fn build<D, P>(splits: &DataSplits<D>, preprocess: &P, seed: u64) -> Result<Self>
    where
        D: Dataset<Example = E>,
        P: Preprocess<E> + ?Sized,
    {
        let build = |split: Split| {
            EagerDataset::build(
                splits.split(split).as_ref(),
                preprocess,
                seed.wrapping_add(split.seed_offset()),
            )
        };

        Ok(Self {
            train: build(Split::Train)?,
            val: build(Split::Val)?,
            test: build(Split::Test)?,
        })
    }
}
