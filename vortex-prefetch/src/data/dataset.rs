//! Dataset abstraction and split registration
//!
//! Raw example retrieval is owned by the dataset; batching and shuffling
//! are layered on top by the cursor, the prefetch queue and the eager
//! dataset.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, TrainerError};

/// Dense label vector. One-hot for single-label data, multi-hot for
/// multilabel data.
pub type Label = Vec<f32>;

/// A raw example paired with its label
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<E> {
    /// Example payload
    pub example: E,
    /// Label vector
    pub label: Label,
}

impl<E> Sample<E> {
    /// Create a new sample
    pub fn new(example: E, label: Label) -> Self {
        Self { example, label }
    }
}

/// Source of raw examples with a finite size
pub trait Dataset: Send + Sync + 'static {
    /// Raw example type
    type Example: Clone + Send + 'static;

    /// Number of examples in the dataset
    fn num_examples(&self) -> usize;

    /// Retrieve the example at `index`
    fn get(&self, index: usize) -> Result<Sample<Self::Example>>;
}

/// Dataset split identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    /// Offset mixed into the run seed so each split shuffles independently
    pub fn seed_offset(self) -> u64 {
        match self {
            Split::Train => 0,
            Split::Val => 1,
            Split::Test => 2,
        }
    }

    /// Lowercase split name
    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Train, validation and test splits of one dataset
pub struct DataSplits<D> {
    pub train: Arc<D>,
    pub val: Arc<D>,
    pub test: Arc<D>,
}

impl<D: Dataset> DataSplits<D> {
    /// Bundle three splits
    pub fn new(train: D, val: D, test: D) -> Self {
        Self {
            train: Arc::new(train),
            val: Arc::new(val),
            test: Arc::new(test),
        }
    }

    /// Get a split by identifier
    pub fn split(&self, split: Split) -> &Arc<D> {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }
}

impl<D> Clone for DataSplits<D> {
    fn clone(&self) -> Self {
        Self {
            train: self.train.clone(),
            val: self.val.clone(),
            test: self.test.clone(),
        }
    }
}

/// Dataset held entirely in memory
#[derive(Debug, Clone)]
pub struct InMemoryDataset<E> {
    samples: Vec<Sample<E>>,
}

impl<E> InMemoryDataset<E> {
    /// Create a dataset from samples
    pub fn new(samples: Vec<Sample<E>>) -> Self {
        Self { samples }
    }

    /// Create a dataset from parallel example and label vectors
    pub fn from_parts(examples: Vec<E>, labels: Vec<Label>) -> Result<Self> {
        if examples.len() != labels.len() {
            return Err(TrainerError::InvalidConfig {
                reason: format!(
                    "{} examples but {} labels",
                    examples.len(),
                    labels.len()
                ),
            });
        }
        let samples = examples
            .into_iter()
            .zip(labels)
            .map(|(example, label)| Sample::new(example, label))
            .collect();
        Ok(Self { samples })
    }

    /// Borrow all samples
    pub fn samples(&self) -> &[Sample<E>] {
        &self.samples
    }
}

impl<E: Clone + Send + Sync + 'static> Dataset for InMemoryDataset<E> {
    type Example = E;

    fn num_examples(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<Sample<E>> {
        self.samples
            .get(index)
            .cloned()
            .ok_or(TrainerError::IndexOutOfRange {
                index,
                len: self.samples.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_get() {
        let dataset =
            InMemoryDataset::from_parts(vec![1u32, 2, 3], vec![vec![1.0], vec![0.0], vec![1.0]])
                .unwrap();

        assert_eq!(dataset.num_examples(), 3);
        assert_eq!(dataset.get(1).unwrap(), Sample::new(2, vec![0.0]));
        assert!(matches!(
            dataset.get(3),
            Err(TrainerError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_from_parts_rejects_mismatch() {
        let result = InMemoryDataset::from_parts(vec![1u32, 2], vec![vec![1.0]]);
        assert!(result.is_err());
    }
}
