//! Batches and per-step feed bindings

use super::dataset::{Label, Sample};

/// A fixed-size group of preprocessed examples and their labels
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<E> {
    /// Preprocessed examples
    pub examples: Vec<E>,
    /// Labels, index-aligned with `examples`
    pub labels: Vec<Label>,
}

impl<E> Batch<E> {
    /// Create an empty batch with room for `capacity` examples
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            examples: Vec::with_capacity(capacity),
            labels: Vec::with_capacity(capacity),
        }
    }

    /// Append one sample
    pub fn push(&mut self, sample: Sample<E>) {
        self.examples.push(sample.example);
        self.labels.push(sample.label);
    }

    /// Number of examples in the batch
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// Whether the batch holds no examples
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

/// Binding of one batch to the model inputs for a single step.
///
/// Built fresh for every step and dropped after use.
#[derive(Debug)]
pub struct Feed<'a, E> {
    batch: &'a Batch<E>,
    dropout: f32,
}

impl<'a, E> Feed<'a, E> {
    /// Bind a batch with the given dropout rate
    pub fn new(batch: &'a Batch<E>, dropout: f32) -> Self {
        Self { batch, dropout }
    }

    /// Bind a batch for evaluation (no dropout)
    pub fn eval(batch: &'a Batch<E>) -> Self {
        Self::new(batch, 0.0)
    }

    /// Same binding with a different dropout rate
    pub fn with_dropout(&self, dropout: f32) -> Self {
        Self {
            batch: self.batch,
            dropout,
        }
    }

    /// Bound batch
    pub fn batch(&self) -> &'a Batch<E> {
        self.batch
    }

    /// Bound examples
    pub fn examples(&self) -> &'a [E] {
        &self.batch.examples
    }

    /// Bound labels
    pub fn labels(&self) -> &'a [Label] {
        &self.batch.labels
    }

    /// Dropout rate for this step
    pub fn dropout(&self) -> f32 {
        self.dropout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_with_dropout_rebinds_same_batch() {
        let mut batch = Batch::with_capacity(2);
        batch.push(Sample::new(1u8, vec![1.0, 0.0]));
        batch.push(Sample::new(2u8, vec![0.0, 1.0]));

        let feed = Feed::new(&batch, 0.5);
        let eval = feed.with_dropout(0.0);

        assert_eq!(feed.dropout(), 0.5);
        assert_eq!(eval.dropout(), 0.0);
        assert_eq!(eval.examples(), &[1, 2]);
        assert!(std::ptr::eq(feed.batch(), eval.batch()));
    }
}
