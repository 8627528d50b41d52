//! Vortex Prefetch - overlapped data preparation for training loops
//!
//! This crate provides:
//! - A bounded, backpressured prefetch queue fed by background producers
//! - An eagerly preprocessed dataset as the synchronous alternative
//! - A training orchestrator with periodic evaluation, checkpoint
//!   requests, held-out evaluation and interruption handling

pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod runtime;
pub mod trainer;

pub use config::{FeedMode, TrainerConfig};
pub use error::{Result, TrainerError};
pub use runtime::{ShutdownSignal, TrainerRuntime};
pub use trainer::{Metrics, Model, Trainer, TrainingReport};

/// Default buffer depth multiplier; queue capacity is this times the batch size
pub use config::DEFAULT_CAPACITY_MULTIPLIER;
