//! Training orchestrator
//!
//! Drives a model through `INIT -> TRAIN_LOOP -> TEST_EVAL -> DONE`.
//! Each phase draws from one `BatchSource` per split, is raced against the
//! interruption signal, and releases every queue it opened before the
//! next phase starts, however it ended.

use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, info};

use super::model::{kind_name, Metrics, Model};
use super::report::{
    DisplayRecord, MetricAccumulator, PhaseOutcome, Reporter, TestSummary, Timing,
    TrainingReport,
};
use super::schedule::Cadence;
use crate::config::TrainerConfig;
use crate::data::{
    BatchSource, DataSplits, Dataset, EagerSplits, Feed, PrefetchQueue, Preprocess, QueueConfig,
    QueueStats, QueueStatus, Split,
};
use crate::error::{Result, TrainerError};
use crate::metrics::standard;
use crate::runtime::ShutdownSignal;

/// Runs training, periodic evaluation and the final test evaluation
pub struct Trainer<D: Dataset, P, M> {
    model: M,
    splits: DataSplits<D>,
    preprocess: Arc<P>,
    config: TrainerConfig,
    /// Runtime the background producers are spawned on
    prefetch: Handle,
    interrupt: ShutdownSignal,
    reporter: Reporter,
    /// Every queue opened by the current run
    opened: Vec<Arc<QueueStatus>>,
}

impl<D, P, M> Trainer<D, P, M>
where
    D: Dataset,
    P: Preprocess<D::Example>,
    M: Model<D::Example>,
{
    /// Create a trainer. Fails if the configuration is invalid.
    pub fn new(
        model: M,
        splits: DataSplits<D>,
        preprocess: P,
        config: TrainerConfig,
        prefetch: Handle,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model,
            splits,
            preprocess: Arc::new(preprocess),
            config,
            prefetch,
            interrupt: ShutdownSignal::new(),
            reporter: Reporter::stdout(),
            opened: Vec::new(),
        })
    }

    /// Use an externally owned interruption signal
    pub fn with_interrupt(mut self, interrupt: ShutdownSignal) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Send progress lines somewhere other than stdout
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Signal that interrupts the running phase when triggered
    pub fn interrupt_signal(&self) -> ShutdownSignal {
        self.interrupt.clone()
    }

    /// Borrow the model
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Current state of every queue opened by the last run
    pub fn queue_stats(&self) -> Vec<QueueStats> {
        self.opened.iter().map(|status| status.stats()).collect()
    }

    /// Run the whole schedule.
    ///
    /// User interruptions end the current phase and are not errors. Any
    /// other failure is returned after the queues of the failing phase
    /// have been closed.
    pub async fn run(&mut self) -> Result<TrainingReport> {
        self.opened.clear();

        // INIT
        let global_step = self.model.initialize()?;
        standard::GLOBAL_STEP.set(global_step as i64);

        let batch_size = self.config.batch_size;
        let test_examples = self.splits.test.num_examples();
        if test_examples < batch_size {
            return Err(TrainerError::TestSplitTooSmall {
                num_examples: test_examples,
                batch_size,
            });
        }

        info!(
            global_step,
            max_steps = self.config.max_steps,
            batch_size,
            feed_mode = ?self.config.feed_mode,
            capacity = self.config.capacity(),
            "Starting training run"
        );

        let mut eager = if self.config.preprocess_first() {
            Some(EagerSplits::build(
                &self.splits,
                self.preprocess.as_ref(),
                self.config.seed,
            )?)
        } else {
            None
        };

        let mut report = TrainingReport::new(self.config.feed_mode, global_step);

        // TRAIN_LOOP
        let outcome = self.train_phase(global_step, eager.as_mut(), &mut report).await?;
        report.train_outcome = outcome;

        self.reporter.line("Optimization finished!")?;
        self.reporter
            .line("Evaluate on test set. This can take a few minutes.")?;

        // TEST_EVAL
        let outcome = self.test_phase(eager.as_mut(), &mut report).await?;
        report.test_outcome = outcome;

        // DONE
        report.queues = self.queue_stats();
        info!(
            steps_completed = report.steps_completed,
            train = ?report.train_outcome,
            test = ?report.test_outcome,
            "Training run finished"
        );
        Ok(report)
    }

    async fn train_phase(
        &mut self,
        global_step: u64,
        eager: Option<&mut EagerSplits<D::Example>>,
        report: &mut TrainingReport,
    ) -> Result<PhaseOutcome> {
        let (mut train, mut val) = match eager {
            Some(eager) => (
                BatchSource::Eager {
                    dataset: &mut eager.train,
                    shuffle: true,
                },
                BatchSource::Eager {
                    dataset: &mut eager.val,
                    shuffle: true,
                },
            ),
            None => (
                self.open_queue(Split::Train, true)?,
                self.open_queue(Split::Val, true)?,
            ),
        };

        let interrupt = self.interrupt.clone();
        let result = tokio::select! {
            biased;
            _ = interrupt.wait() => Err(TrainerError::Interrupted),
            result = self.train_loop(global_step, &mut train, &mut val, report) => result,
        };
        // Interrupts from here on, including during release, belong to TEST_EVAL
        self.interrupt.reset();

        train.release().await;
        val.release().await;

        match result {
            Ok(()) => Ok(PhaseOutcome::Completed),
            Err(e) if e.is_interruption() => {
                info!(steps_completed = report.steps_completed, "Training interrupted");
                self.reporter.line("")?;
                Ok(PhaseOutcome::Interrupted)
            }
            Err(e) => Err(e),
        }
    }

    async fn train_loop(
        &mut self,
        global_step: u64,
        train: &mut BatchSource<'_, D::Example>,
        val: &mut BatchSource<'_, D::Example>,
        report: &mut TrainingReport,
    ) -> Result<()> {
        let batch_size = self.config.batch_size;
        let display = Cadence::new(self.config.display_step);
        let save = Cadence::new(self.config.save_step);

        for step in global_step..self.config.max_steps {
            // Let a pending interruption win before starting the step
            tokio::task::yield_now().await;

            let start = Instant::now();
            let batch = train.next_batch(batch_size).await?;
            let feed = Feed::new(&batch, self.config.dropout);
            let preprocess_time = start.elapsed();

            let train_time = self.model.train(&feed, step)?;
            standard::TRAIN_STEP_DURATION.observe_duration(train_time);
            standard::GLOBAL_STEP.set(step as i64);
            report.steps_completed += 1;

            tokio::task::yield_now().await;

            if display.is_due(step) {
                let train_metrics = self.evaluate(&feed.with_dropout(0.0))?;
                let val_batch = val.next_batch(batch_size).await?;
                let val_metrics = self.evaluate(&Feed::eval(&val_batch))?;

                let timing = if train.is_streaming() {
                    Timing::Streaming {
                        preprocess: preprocess_time,
                        train: train_time,
                    }
                } else {
                    Timing::Eager { train: train_time }
                };
                let record = DisplayRecord {
                    step,
                    timing,
                    train: train_metrics,
                    val: val_metrics,
                };
                self.reporter.line(&record.to_string())?;
                report.displays.push(record);
            }

            if save.is_due(step) {
                self.model.save()?;
                standard::CHECKPOINTS_REQUESTED.inc();
                report.checkpoints.push(step);
                debug!(step, "Checkpoint requested");
            }
        }

        Ok(())
    }

    async fn test_phase(
        &mut self,
        eager: Option<&mut EagerSplits<D::Example>>,
        report: &mut TrainingReport,
    ) -> Result<PhaseOutcome> {
        let mut test = match eager {
            Some(eager) => BatchSource::Eager {
                dataset: &mut eager.test,
                shuffle: false,
            },
            None => self.open_queue(Split::Test, false)?,
        };

        let interrupt = self.interrupt.clone();
        let result = tokio::select! {
            biased;
            _ = interrupt.wait() => Err(TrainerError::Interrupted),
            result = self.test_loop(&mut test) => result,
        };

        test.release().await;

        match result {
            Ok(summary) => {
                self.reporter.line(&summary.to_string())?;
                report.test = Some(summary);
                Ok(PhaseOutcome::Completed)
            }
            Err(e) if e.is_interruption() => {
                info!("Test evaluation interrupted");
                self.reporter.line("")?;
                self.reporter.line("Test evaluation aborted.")?;
                Ok(PhaseOutcome::Interrupted)
            }
            Err(e) => Err(e),
        }
    }

    async fn test_loop(&mut self, test: &mut BatchSource<'_, D::Example>) -> Result<TestSummary> {
        let batch_size = self.config.batch_size;
        let num_examples = self.splits.test.num_examples();
        // Trailing examples that cannot fill a batch are not evaluated
        let num_batches = num_examples / batch_size;

        let mut accumulator = MetricAccumulator::new(self.model.is_multilabel());
        for _ in 0..num_batches {
            tokio::task::yield_now().await;
            let batch = test.next_batch(batch_size).await?;
            let metrics = self.evaluate(&Feed::eval(&batch))?;
            accumulator.add(&metrics);
        }

        Ok(TestSummary {
            num_batches,
            examples_dropped: num_examples - num_batches * batch_size,
            metrics: accumulator.mean()?,
        })
    }

    /// Evaluate and check the metric shape against the model's label mode
    fn evaluate(&mut self, feed: &Feed<'_, D::Example>) -> Result<Metrics> {
        let metrics = self.model.evaluate(feed)?;
        let expected = self.model.is_multilabel();
        if metrics.is_multilabel() != expected {
            return Err(TrainerError::MetricShapeMismatch {
                expected: kind_name(expected),
                actual: metrics.kind(),
            });
        }
        Ok(metrics)
    }

    fn open_queue<'a>(&mut self, split: Split, shuffle: bool) -> Result<BatchSource<'a, D::Example>> {
        let queue = PrefetchQueue::spawn(
            &self.prefetch,
            split,
            self.splits.split(split).clone(),
            self.preprocess.clone(),
            QueueConfig {
                batch_size: self.config.batch_size,
                capacity: self.config.capacity(),
                shuffle,
                seed: self.config.seed.wrapping_add(split.seed_offset()),
            },
        )?;
        self.opened.push(queue.status());
        Ok(BatchSource::Streaming(queue))
    }
}
