//! Training binary
//!
//! Trains a softmax regression classifier on synthetic Gaussian-blob data
//! to exercise the full pipeline end to end.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use vortex_prefetch::data::{DataSplits, Feed, InMemoryDataset, Label};
use vortex_prefetch::metrics::gather_system_metrics;
use vortex_prefetch::runtime::RuntimeConfig;
use vortex_prefetch::{
    Metrics, Model, Result, Trainer, TrainerConfig, TrainerError, TrainerRuntime,
};

const NUM_FEATURES: usize = 8;
const NUM_CLASSES: usize = 3;
const LEARNING_RATE: f32 = 0.05;

/// Gaussian-ish blobs around one centre per class
fn synthetic_split(num_examples: usize, seed: u64) -> Result<InMemoryDataset<Vec<f32>>> {
    let mut centre_rng = StdRng::seed_from_u64(7);
    let centres: Vec<Vec<f32>> = (0..NUM_CLASSES)
        .map(|_| {
            (0..NUM_FEATURES)
                .map(|_| centre_rng.gen_range(-4.0f32..4.0))
                .collect()
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut examples = Vec::with_capacity(num_examples);
    let mut labels = Vec::with_capacity(num_examples);
    for _ in 0..num_examples {
        let class = rng.gen_range(0..NUM_CLASSES);
        let features = centres[class]
            .iter()
            .map(|c| {
                // Sum of uniforms approximates a normal
                let noise: f32 = (0..4).map(|_| rng.gen_range(-1.0f32..1.0)).sum();
                c + noise
            })
            .collect();
        let mut label = vec![0.0; NUM_CLASSES];
        label[class] = 1.0;
        examples.push(features);
        labels.push(label);
    }

    InMemoryDataset::from_parts(examples, labels)
}

/// Per-feature mean and standard deviation of a dataset
fn feature_moments(dataset: &InMemoryDataset<Vec<f32>>) -> (Vec<f32>, Vec<f32>) {
    let n = dataset.samples().len().max(1) as f32;
    let mut mean = vec![0.0f32; NUM_FEATURES];
    for sample in dataset.samples() {
        for (m, x) in mean.iter_mut().zip(&sample.example) {
            *m += x / n;
        }
    }
    let mut std_dev = vec![0.0f32; NUM_FEATURES];
    for sample in dataset.samples() {
        for ((s, x), m) in std_dev.iter_mut().zip(&sample.example).zip(&mean) {
            *s += (x - m).powi(2) / n;
        }
    }
    for s in &mut std_dev {
        *s = s.sqrt().max(1e-6);
    }
    (mean, std_dev)
}

#[derive(Serialize, Deserialize)]
struct Checkpoint {
    step: u64,
    saved_at: DateTime<Utc>,
    weights: Vec<f32>,
    bias: Vec<f32>,
}

/// Multinomial logistic regression trained with plain SGD
struct SoftmaxRegression {
    weights: Vec<f32>,
    bias: Vec<f32>,
    step: u64,
    checkpoint_path: PathBuf,
    rng: StdRng,
}

impl SoftmaxRegression {
    fn new(checkpoint_dir: PathBuf, seed: u64) -> Self {
        Self {
            weights: vec![0.0; NUM_FEATURES * NUM_CLASSES],
            bias: vec![0.0; NUM_CLASSES],
            step: 0,
            checkpoint_path: checkpoint_dir.join("softmax.json"),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn probabilities(&self, features: &[f32]) -> Vec<f32> {
        let logits: Vec<f32> = (0..NUM_CLASSES)
            .map(|k| {
                let row = &self.weights[k * NUM_FEATURES..(k + 1) * NUM_FEATURES];
                row.iter().zip(features).map(|(w, x)| w * x).sum::<f32>() + self.bias[k]
            })
            .collect();
        let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exp: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f32 = exp.iter().sum();
        exp.into_iter().map(|e| e / total).collect()
    }

    fn target(label: &Label) -> Result<usize> {
        if label.len() != NUM_CLASSES {
            return Err(TrainerError::LabelWidth {
                expected: NUM_CLASSES,
                actual: label.len(),
            });
        }
        Ok(argmax(label))
    }
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

impl Model<Vec<f32>> for SoftmaxRegression {
    fn initialize(&mut self) -> Result<u64> {
        if !self.checkpoint_path.exists() {
            info!("No checkpoint found, starting fresh");
            return Ok(0);
        }
        let raw = std::fs::read_to_string(&self.checkpoint_path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&raw)?;
        self.weights = checkpoint.weights;
        self.bias = checkpoint.bias;
        self.step = checkpoint.step;
        info!(
            step = checkpoint.step,
            saved_at = %checkpoint.saved_at,
            "Restored from checkpoint"
        );
        Ok(checkpoint.step + 1)
    }

    fn train(&mut self, feed: &Feed<'_, Vec<f32>>, step: u64) -> Result<Duration> {
        let start = Instant::now();
        let keep = 1.0 - feed.dropout();
        let scale = 1.0 / (feed.batch().len() as f32);

        let mut grad_w = vec![0.0f32; self.weights.len()];
        let mut grad_b = vec![0.0f32; self.bias.len()];
        for (features, label) in feed.examples().iter().zip(feed.labels()) {
            // Inverted dropout on the inputs
            let input: Vec<f32> = features
                .iter()
                .map(|x| if self.rng.gen::<f32>() < keep { x / keep } else { 0.0 })
                .collect();
            let target = Self::target(label)?;
            let probs = self.probabilities(&input);
            for k in 0..NUM_CLASSES {
                let delta = probs[k] - if k == target { 1.0 } else { 0.0 };
                grad_b[k] += delta * scale;
                for (j, x) in input.iter().enumerate() {
                    grad_w[k * NUM_FEATURES + j] += delta * x * scale;
                }
            }
        }

        for (w, g) in self.weights.iter_mut().zip(&grad_w) {
            *w -= LEARNING_RATE * g;
        }
        for (b, g) in self.bias.iter_mut().zip(&grad_b) {
            *b -= LEARNING_RATE * g;
        }
        self.step = step;

        Ok(start.elapsed())
    }

    fn evaluate(&mut self, feed: &Feed<'_, Vec<f32>>) -> Result<Metrics> {
        let mut loss = 0.0f64;
        let mut correct = 0usize;
        for (features, label) in feed.examples().iter().zip(feed.labels()) {
            let target = Self::target(label)?;
            let probs = self.probabilities(features);
            loss -= f64::from(probs[target].max(1e-12)).ln();
            if argmax(&probs) == target {
                correct += 1;
            }
        }
        let n = feed.batch().len().max(1) as f64;
        Ok(Metrics::SingleLabel {
            loss: loss / n,
            accuracy: correct as f64 / n,
        })
    }

    fn save(&mut self) -> Result<()> {
        if let Some(dir) = self.checkpoint_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let checkpoint = Checkpoint {
            step: self.step,
            saved_at: Utc::now(),
            weights: self.weights.clone(),
            bias: self.bias.clone(),
        };
        // Write then rename so a crash never leaves a torn checkpoint
        let tmp = self.checkpoint_path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&checkpoint)?)?;
        std::fs::rename(&tmp, &self.checkpoint_path)?;
        debug!(step = self.step, path = %self.checkpoint_path.display(), "Checkpoint written");
        Ok(())
    }

    fn is_multilabel(&self) -> bool {
        false
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Vortex trainer");

    // Load configuration
    let mut config = match std::env::var("VORTEX_CONFIG") {
        Ok(path) => TrainerConfig::from_json_file(path)?,
        Err(_) => TrainerConfig::default(),
    };
    config.apply_env()?;
    let checkpoint_dir =
        PathBuf::from(std::env::var("VORTEX_CHECKPOINT_DIR").unwrap_or_else(|_| "checkpoints".into()));

    let train = synthetic_split(2000, config.seed)?;
    let (mean, std_dev) = feature_moments(&train);
    let splits = DataSplits::new(
        train,
        synthetic_split(400, config.seed.wrapping_add(1))?,
        synthetic_split(450, config.seed.wrapping_add(2))?,
    );
    let standardise = move |features: Vec<f32>| -> Result<Vec<f32>> {
        if features.len() != NUM_FEATURES {
            return Err(TrainerError::preprocess(format!(
                "expected {} features, got {}",
                NUM_FEATURES,
                features.len()
            )));
        }
        Ok(features
            .iter()
            .zip(&mean)
            .zip(&std_dev)
            .map(|((x, m), s)| (x - m) / s)
            .collect())
    };

    let runtime = TrainerRuntime::new(RuntimeConfig::default())?;
    let model = SoftmaxRegression::new(checkpoint_dir, config.seed);
    let mut trainer = Trainer::new(model, splits, standardise, config, runtime.prefetch_handle())?;
    let _ctrl_c = trainer
        .interrupt_signal()
        .listen_for_ctrl_c(&runtime.control_handle());

    let report = runtime.block_on(async { trainer.run().await })?;

    if let Ok(path) = std::env::var("VORTEX_REPORT") {
        std::fs::write(&path, serde_json::to_vec_pretty(&report)?)?;
        info!("Report written to {}", path);
    }
    if report.queues.iter().any(|q| q.producer_running) {
        warn!("A producer was still running after its queue closed");
    }
    debug!("Pipeline metrics:\n{}", gather_system_metrics());

    runtime.shutdown();
    Ok(())
}
