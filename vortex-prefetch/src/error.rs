//! Error types for the prefetch trainer
//!
//! Covers data access, the prefetch queue, model collaborators and
//! orchestration of the training phases.

use thiserror::Error;

use crate::data::Split;

/// Primary error type for all trainer operations
#[derive(Debug, Error)]
pub enum TrainerError {
    // ========== Data Errors ==========

    /// Dataset has no examples to draw batches from
    #[error("Dataset has no examples")]
    EmptyDataset,

    /// Example index outside the dataset
    #[error("Example index {index} out of range for dataset of {len} examples")]
    IndexOutOfRange { index: usize, len: usize },

    /// Preprocessing transform rejected an example
    #[error("Preprocessing failed: {reason}")]
    Preprocess { reason: String },

    /// Label width differs from the rest of the batch
    #[error("Label of width {actual} does not match expected width {expected}")]
    LabelWidth { expected: usize, actual: usize },

    // ========== Queue Errors ==========

    /// Queue was closed and has no buffered batches left
    #[error("Prefetch queue for {split} split is closed")]
    QueueClosed { split: Split },

    /// Background producer failed while building a batch
    #[error("Producer for {split} split failed: {source}")]
    ProducerFailed {
        split: Split,
        #[source]
        source: Box<TrainerError>,
    },

    // ========== Model Errors ==========

    /// Error raised by the model collaborator
    #[error("Model error: {message}")]
    Model { message: String },

    /// Model returned metrics of the wrong shape for its label mode
    #[error("Model reported {actual} metrics but is configured as {expected}")]
    MetricShapeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    // ========== Orchestration Errors ==========

    /// User interruption of the current phase
    #[error("Interrupted by user")]
    Interrupted,

    /// Test split cannot fill a single batch
    #[error("Test split of {num_examples} examples is smaller than one batch of {batch_size}")]
    TestSplitTooSmall { num_examples: usize, batch_size: usize },

    /// Configuration rejected by validation
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // ========== Runtime Errors ==========

    /// I/O failure (config files, report sink)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TrainerError {
    /// Returns true if this error is a user interruption
    pub fn is_interruption(&self) -> bool {
        matches!(self, TrainerError::Interrupted)
    }

    /// Returns true if this error originated in a background producer
    pub fn is_producer_failure(&self) -> bool {
        matches!(self, TrainerError::ProducerFailed { .. })
    }

    /// Convenience constructor for model collaborators
    pub fn model(message: impl Into<String>) -> Self {
        TrainerError::Model {
            message: message.into(),
        }
    }

    /// Convenience constructor for preprocessing transforms
    pub fn preprocess(reason: impl Into<String>) -> Self {
        TrainerError::Preprocess {
            reason: reason.into(),
        }
    }
}

/// Result type alias for trainer operations
pub type Result<T> = std::result::Result<T, TrainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_failure_keeps_source() {
        let err = TrainerError::ProducerFailed {
            split: Split::Train,
            source: Box::new(TrainerError::preprocess("bad pixel")),
        };

        assert!(err.is_producer_failure());
        assert!(!err.is_interruption());
        assert_eq!(
            err.to_string(),
            "Producer for train split failed: Preprocessing failed: bad pixel"
        );
    }
}
