//! Training loop orchestration
//!
//! Model contract, step cadences, reporting and the orchestrator itself.

pub mod model;
pub mod orchestrator;
pub mod report;
pub mod schedule;

pub use model::{Metrics, Model};
pub use orchestrator::Trainer;
pub use report::{
    DisplayRecord, LogCapture, MetricAccumulator, PhaseOutcome, Reporter, TestSummary, Timing,
    TrainingReport,
};
pub use schedule::Cadence;
