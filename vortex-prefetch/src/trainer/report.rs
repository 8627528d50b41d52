//! Progress lines and the end-of-run report

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use super::model::Metrics;
use crate::config::FeedMode;
use crate::data::QueueStats;
use crate::error::{Result, TrainerError};

/// How long one display step took
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Timing {
    /// Waiting for the batch plus the training step
    Streaming { preprocess: Duration, train: Duration },
    /// Training step only; preprocessing happened up front
    Eager { train: Duration },
}

/// Metrics logged at one display step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayRecord {
    pub step: u64,
    pub timing: Timing,
    pub train: Metrics,
    pub val: Metrics,
}

fn write_metrics(f: &mut fmt::Formatter<'_>, prefix: &str, metrics: &Metrics) -> fmt::Result {
    match metrics {
        Metrics::SingleLabel { loss, accuracy } => {
            write!(f, "{prefix}_loss={loss:.5}, {prefix}_acc={accuracy:.5}")
        }
        Metrics::MultiLabel {
            loss,
            top_accuracy,
            threshold_accuracy,
        } => write!(
            f,
            "{prefix}_loss={loss:.5}, {prefix}_top_acc={top_accuracy:.5}, \
             {prefix}_threshold_acc={threshold_accuracy:.5}"
        ),
    }
}

impl fmt::Display for DisplayRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step={}, ", self.step)?;
        match self.timing {
            Timing::Streaming { preprocess, train } => write!(
                f,
                "time={:.2}s + {:.2}s, ",
                preprocess.as_secs_f64(),
                train.as_secs_f64()
            )?,
            Timing::Eager { train } => write!(f, "time={:.2}s, ", train.as_secs_f64())?,
        }
        write_metrics(f, "train", &self.train)?;
        f.write_str(", ")?;
        write_metrics(f, "val", &self.val)
    }
}

/// Averaged held-out evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    /// Batches evaluated
    pub num_batches: usize,
    /// Trailing examples that did not fill a batch
    pub examples_dropped: usize,
    /// Mean of the per-batch metrics
    pub metrics: Metrics,
}

impl fmt::Display for TestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.metrics {
            Metrics::SingleLabel { loss, accuracy } => {
                write!(f, "Test results: cost={loss:.5}, acc={accuracy:.5}")
            }
            Metrics::MultiLabel {
                loss,
                top_accuracy,
                threshold_accuracy,
            } => write!(
                f,
                "Test results: cost={loss:.5}, top_acc={top_accuracy:.5}, \
                 threshold_acc={threshold_accuracy:.5}"
            ),
        }
    }
}

/// Running sums for averaging evaluation metrics over batches
#[derive(Debug, Clone)]
pub struct MetricAccumulator {
    multilabel: bool,
    loss: f64,
    acc_1: f64,
    acc_2: f64,
    count: usize,
}

impl MetricAccumulator {
    /// Create an accumulator for the given label mode
    pub fn new(multilabel: bool) -> Self {
        Self {
            multilabel,
            loss: 0.0,
            acc_1: 0.0,
            acc_2: 0.0,
            count: 0,
        }
    }

    /// Add one batch's metrics
    pub fn add(&mut self, metrics: &Metrics) {
        match *metrics {
            Metrics::SingleLabel { loss, accuracy } => {
                self.loss += loss;
                self.acc_1 += accuracy;
            }
            Metrics::MultiLabel {
                loss,
                top_accuracy,
                threshold_accuracy,
            } => {
                self.loss += loss;
                self.acc_1 += top_accuracy;
                self.acc_2 += threshold_accuracy;
            }
        }
        self.count += 1;
    }

    /// Batches added so far
    pub fn count(&self) -> usize {
        self.count
    }

    /// Arithmetic mean over every batch added
    pub fn mean(&self) -> Result<Metrics> {
        if self.count == 0 {
            return Err(TrainerError::Internal {
                message: "cannot average zero batches".into(),
            });
        }
        let n = self.count as f64;
        Ok(if self.multilabel {
            Metrics::MultiLabel {
                loss: self.loss / n,
                top_accuracy: self.acc_1 / n,
                threshold_accuracy: self.acc_2 / n,
            }
        } else {
            Metrics::SingleLabel {
                loss: self.loss / n,
                accuracy: self.acc_1 / n,
            }
        })
    }
}

/// How a phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    Completed,
    Interrupted,
}

/// Everything observable about a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Mode the run used
    pub feed_mode: FeedMode,
    /// Global step returned by the model's initialisation
    pub start_step: u64,
    /// Training steps run to completion
    pub steps_completed: u64,
    pub train_outcome: PhaseOutcome,
    pub test_outcome: PhaseOutcome,
    /// Every display step, in order
    pub displays: Vec<DisplayRecord>,
    /// Steps at which a checkpoint was requested
    pub checkpoints: Vec<u64>,
    /// Held-out results, absent when test evaluation was interrupted
    pub test: Option<TestSummary>,
    /// Final state of every queue opened during the run
    pub queues: Vec<QueueStats>,
}

impl TrainingReport {
    pub(crate) fn new(feed_mode: FeedMode, start_step: u64) -> Self {
        Self {
            feed_mode,
            start_step,
            steps_completed: 0,
            train_outcome: PhaseOutcome::Completed,
            test_outcome: PhaseOutcome::Completed,
            displays: Vec::new(),
            checkpoints: Vec::new(),
            test: None,
            queues: Vec::new(),
        }
    }
}

/// Line-oriented progress output
pub struct Reporter {
    sink: Box<dyn Write + Send>,
}

impl Reporter {
    /// Report to any writer
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    /// Report to standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Report into an in-memory buffer that can be read back
    pub fn capture() -> (Self, LogCapture) {
        let capture = LogCapture::default();
        (Self::new(capture.clone()), capture)
    }

    /// Write one line
    pub fn line(&mut self, line: &str) -> Result<()> {
        writeln!(self.sink, "{}", line)?;
        self.sink.flush()?;
        Ok(())
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::stdout()
    }
}

/// Shared in-memory log sink
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Everything written so far, split into lines
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buffer.lock())
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_single_label_line() {
        let record = DisplayRecord {
            step: 10,
            timing: Timing::Streaming {
                preprocess: Duration::from_millis(10),
                train: Duration::from_millis(250),
            },
            train: Metrics::SingleLabel {
                loss: 0.5,
                accuracy: 0.75,
            },
            val: Metrics::SingleLabel {
                loss: 0.625,
                accuracy: 0.5,
            },
        };

        assert_eq!(
            record.to_string(),
            "step=10, time=0.01s + 0.25s, train_loss=0.50000, train_acc=0.75000, \
             val_loss=0.62500, val_acc=0.50000"
        );
    }

    #[test]
    fn test_eager_multilabel_line() {
        let metrics = Metrics::MultiLabel {
            loss: 1.0,
            top_accuracy: 0.5,
            threshold_accuracy: 0.25,
        };
        let record = DisplayRecord {
            step: 0,
            timing: Timing::Eager {
                train: Duration::from_millis(500),
            },
            train: metrics,
            val: metrics,
        };

        assert_eq!(
            record.to_string(),
            "step=0, time=0.50s, train_loss=1.00000, train_top_acc=0.50000, \
             train_threshold_acc=0.25000, val_loss=1.00000, val_top_acc=0.50000, \
             val_threshold_acc=0.25000"
        );
    }

    #[test]
    fn test_accumulator_mean() {
        let mut acc = MetricAccumulator::new(false);
        assert!(acc.mean().is_err());

        acc.add(&Metrics::SingleLabel {
            loss: 1.0,
            accuracy: 0.5,
        });
        acc.add(&Metrics::SingleLabel {
            loss: 3.0,
            accuracy: 1.0,
        });

        assert_eq!(
            acc.mean().unwrap(),
            Metrics::SingleLabel {
                loss: 2.0,
                accuracy: 0.75
            }
        );

        let summary = TestSummary {
            num_batches: 2,
            examples_dropped: 0,
            metrics: acc.mean().unwrap(),
        };
        assert_eq!(summary.to_string(), "Test results: cost=2.00000, acc=0.75000");
    }
}
