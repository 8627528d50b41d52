//! Prometheus-style metrics for the training pipeline
//!
//! Counters, gauges and histograms in the Prometheus text format.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Counter metric (monotonically increasing)
pub struct Counter {
    value: AtomicU64,
    name: String,
    help: String,
}

impl Counter {
    /// Create a new counter
    pub fn new(name: &str, help: &str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Increment by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by delta
    pub fn inc_by(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Get current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Gauge metric (can go up or down)
pub struct Gauge {
    value: AtomicI64,
    name: String,
    help: String,
}

impl Gauge {
    /// Create a new gauge
    pub fn new(name: &str, help: &str) -> Self {
        Self {
            value: AtomicI64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Set value
    pub fn set(&self, val: i64) {
        self.value.store(val, Ordering::Relaxed);
    }

    /// Increment by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement by 1
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get current value
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} gauge\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Histogram for latency measurements
pub struct Histogram {
    buckets: Vec<(f64, AtomicU64)>,
    sum: AtomicU64,
    count: AtomicU64,
    name: String,
    help: String,
}

impl Histogram {
    /// Create with default buckets
    pub fn new(name: &str, help: &str) -> Self {
        Self::with_buckets(
            name,
            help,
            vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0],
        )
    }

    /// Create with custom buckets
    pub fn with_buckets(name: &str, help: &str, bounds: Vec<f64>) -> Self {
        let buckets = bounds
            .into_iter()
            .map(|b| (b, AtomicU64::new(0)))
            .collect();

        Self {
            buckets,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Observe a value in seconds
    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);

        // Sum kept as u64 micros
        let micros = (value * 1_000_000.0) as u64;
        self.sum.fetch_add(micros, Ordering::Relaxed);

        for (bound, count) in &self.buckets {
            if value <= *bound {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Observe a duration
    pub fn observe_duration(&self, duration: Duration) {
        self.observe(duration.as_secs_f64());
    }

    /// Number of observations
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        let mut output = format!(
            "# HELP {} {}\n# TYPE {} histogram\n",
            self.name, self.help, self.name
        );

        for (bound, count) in &self.buckets {
            output.push_str(&format!(
                "{}_bucket{{le=\"{}\"}} {}\n",
                self.name,
                bound,
                count.load(Ordering::Relaxed)
            ));
        }

        let sum_secs = self.sum.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        output.push_str(&format!("{}_sum {}\n", self.name, sum_secs));
        output.push_str(&format!("{}_count {}\n", self.name, self.count()));

        output
    }
}

/// Standard pipeline metrics
pub mod standard {
    use super::*;
    use std::sync::LazyLock;

    pub static BATCHES_PREPROCESSED: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new(
            "vortex_batches_preprocessed_total",
            "Batches built by background producers",
        )
    });

    pub static EXAMPLES_PREPROCESSED: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new(
            "vortex_examples_preprocessed_total",
            "Examples passed through the preprocessing transform",
        )
    });

    pub static BATCHES_DEQUEUED: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new(
            "vortex_batches_dequeued_total",
            "Batches taken from prefetch queues",
        )
    });

    pub static CHECKPOINTS_REQUESTED: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new(
            "vortex_checkpoints_requested_total",
            "Checkpoint requests issued to the model",
        )
    });

    pub static ACTIVE_PRODUCERS: LazyLock<Gauge> = LazyLock::new(|| {
        Gauge::new("vortex_active_producers", "Running background producers")
    });

    pub static GLOBAL_STEP: LazyLock<Gauge> =
        LazyLock::new(|| Gauge::new("vortex_global_step", "Last completed training step"));

    pub static DEQUEUE_WAIT: LazyLock<Histogram> = LazyLock::new(|| {
        Histogram::new(
            "vortex_dequeue_wait_seconds",
            "Time spent waiting for the next batch",
        )
    });

    pub static TRAIN_STEP_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
        Histogram::new(
            "vortex_train_step_duration_seconds",
            "Model training step latency",
        )
    });
}

/// Helper to gather all standard metrics
pub fn gather_system_metrics() -> String {
    let mut output = String::new();

    // Counters
    output.push_str(&standard::BATCHES_PREPROCESSED.to_prometheus());
    output.push_str(&standard::EXAMPLES_PREPROCESSED.to_prometheus());
    output.push_str(&standard::BATCHES_DEQUEUED.to_prometheus());
    output.push_str(&standard::CHECKPOINTS_REQUESTED.to_prometheus());

    // Gauges
    output.push_str(&standard::ACTIVE_PRODUCERS.to_prometheus());
    output.push_str(&standard::GLOBAL_STEP.to_prometheus());

    // Histograms
    output.push_str(&standard::DEQUEUE_WAIT.to_prometheus());
    output.push_str(&standard::TRAIN_STEP_DURATION.to_prometheus());

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_counter", "Test counter");
        assert_eq!(counter.get(), 0);

        counter.inc();
        assert_eq!(counter.get(), 1);

        counter.inc_by(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new("test_gauge", "Test gauge");
        gauge.set(10);
        gauge.dec();
        assert_eq!(gauge.get(), 9);
    }

    #[test]
    fn test_histogram() {
        let histogram = Histogram::new("test_histogram", "Test histogram");

        histogram.observe(0.001);
        histogram.observe_duration(Duration::from_millis(10));

        assert_eq!(histogram.count(), 2);
        let prometheus = histogram.to_prometheus();
        assert!(prometheus.contains("test_histogram_count 2"));
    }

    #[test]
    fn test_gather_includes_standard_metrics() {
        let output = gather_system_metrics();
        assert!(output.contains("vortex_batches_preprocessed_total"));
        assert!(output.contains("vortex_train_step_duration_seconds_count"));
    }
}
