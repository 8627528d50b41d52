//! Model collaborator contract
//!
//! The trainer never touches weights or gradients; it only drives a model
//! through this trait from a single thread.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::data::Feed;
use crate::error::Result;

/// Evaluation result for one batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metrics {
    /// Single-label model: loss and accuracy
    SingleLabel { loss: f64, accuracy: f64 },
    /// Multilabel model: loss, top-k accuracy and threshold accuracy
    MultiLabel {
        loss: f64,
        top_accuracy: f64,
        threshold_accuracy: f64,
    },
}

impl Metrics {
    /// Batch loss
    pub fn loss(&self) -> f64 {
        match *self {
            Metrics::SingleLabel { loss, .. } | Metrics::MultiLabel { loss, .. } => loss,
        }
    }

    /// Whether these are multilabel metrics
    pub fn is_multilabel(&self) -> bool {
        matches!(self, Metrics::MultiLabel { .. })
    }

    /// Human-readable shape name
    pub fn kind(&self) -> &'static str {
        kind_name(self.is_multilabel())
    }
}

pub(crate) fn kind_name(multilabel: bool) -> &'static str {
    if multilabel {
        "multilabel"
    } else {
        "single-label"
    }
}

/// Trainable model driven by the trainer
pub trait Model<E> {
    /// Prepare the model and return the global step to resume from
    fn initialize(&mut self) -> Result<u64>;

    /// Run one optimisation step and return the time it took
    fn train(&mut self, feed: &Feed<'_, E>, step: u64) -> Result<Duration>;

    /// Evaluate a batch without updating the model
    fn evaluate(&mut self, feed: &Feed<'_, E>) -> Result<Metrics>;

    /// Persist a checkpoint
    fn save(&mut self) -> Result<()>;

    /// Whether `evaluate` reports multilabel metrics
    fn is_multilabel(&self) -> bool;
}
