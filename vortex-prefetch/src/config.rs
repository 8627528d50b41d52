//! Trainer configuration
//!
//! Loaded from JSON, overridable from the environment, validated before
//! the run starts.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TrainerError};

/// Default buffer depth, in batches per example of batch size
pub const DEFAULT_CAPACITY_MULTIPLIER: usize = 10;

/// Who preprocesses the examples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Background producers preprocess concurrently with training
    Streaming,
    /// Every split is preprocessed once before training starts
    Eager,
}

impl FeedMode {
    /// Parse a mode name
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "streaming" => Ok(FeedMode::Streaming),
            "eager" => Ok(FeedMode::Eager),
            other => Err(TrainerError::InvalidConfig {
                reason: format!("unknown feed mode '{}'", other),
            }),
        }
    }
}

/// Configuration for a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Examples per batch
    pub batch_size: usize,
    /// Dropout rate applied during training steps
    pub dropout: f32,
    /// Step at which training stops (exclusive)
    pub max_steps: u64,
    /// Streaming or eager preprocessing
    pub feed_mode: FeedMode,
    /// Log train/val metrics every this many steps
    pub display_step: u64,
    /// Request a checkpoint every this many steps
    pub save_step: u64,
    /// Queue capacity is `capacity_multiplier * batch_size` batches
    pub capacity_multiplier: usize,
    /// Seed for shuffling orders
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            dropout: 0.5,
            max_steps: 1000,
            feed_mode: FeedMode::Streaming,
            display_step: 10,
            save_step: 250,
            capacity_multiplier: DEFAULT_CAPACITY_MULTIPLIER,
            seed: 42,
        }
    }
}

impl TrainerConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: TrainerConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Apply `VORTEX_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VORTEX_BATCH_SIZE") {
            self.batch_size = parse_field("VORTEX_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("VORTEX_DROPOUT") {
            self.dropout = parse_field("VORTEX_DROPOUT", &v)?;
        }
        if let Some(v) = lookup("VORTEX_MAX_STEPS") {
            self.max_steps = parse_field("VORTEX_MAX_STEPS", &v)?;
        }
        if let Some(v) = lookup("VORTEX_FEED_MODE") {
            self.feed_mode = FeedMode::parse(&v)?;
        }
        if let Some(v) = lookup("VORTEX_DISPLAY_STEP") {
            self.display_step = parse_field("VORTEX_DISPLAY_STEP", &v)?;
        }
        if let Some(v) = lookup("VORTEX_SAVE_STEP") {
            self.save_step = parse_field("VORTEX_SAVE_STEP", &v)?;
        }
        if let Some(v) = lookup("VORTEX_CAPACITY_MULTIPLIER") {
            self.capacity_multiplier = parse_field("VORTEX_CAPACITY_MULTIPLIER", &v)?;
        }
        if let Some(v) = lookup("VORTEX_SEED") {
            self.seed = parse_field("VORTEX_SEED", &v)?;
        }
        Ok(())
    }

    /// Reject settings the trainer cannot run with
    pub fn validate(&self) -> Result<()> {
        let reason = if self.batch_size == 0 {
            "batch_size must be positive"
        } else if self.display_step == 0 {
            "display_step must be positive"
        } else if self.save_step == 0 {
            "save_step must be positive"
        } else if self.capacity_multiplier == 0 {
            "capacity_multiplier must be positive"
        } else if !(0.0..1.0).contains(&self.dropout) {
            "dropout must be in [0, 1)"
        } else {
            return Ok(());
        };

        Err(TrainerError::InvalidConfig {
            reason: reason.into(),
        })
    }

    /// Queue capacity in batches
    pub fn capacity(&self) -> usize {
        self.capacity_multiplier * self.batch_size
    }

    /// Whether every split is preprocessed up front
    pub fn preprocess_first(&self) -> bool {
        self.feed_mode == FeedMode::Eager
    }
}

fn parse_field<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| TrainerError::InvalidConfig {
        reason: format!("cannot parse {}='{}'", key, value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrainerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.capacity(), 640);
        assert!(!config.preprocess_first());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: TrainerConfig =
            serde_json::from_str(r#"{"batch_size": 8, "feed_mode": "eager"}"#).unwrap();

        assert_eq!(config.batch_size, 8);
        assert_eq!(config.feed_mode, FeedMode::Eager);
        assert_eq!(config.display_step, 10);
        assert_eq!(config.save_step, 250);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("VORTEX_MAX_STEPS", "21"),
            ("VORTEX_FEED_MODE", "Eager"),
            ("VORTEX_DROPOUT", "0.25"),
        ]
        .into_iter()
        .collect();

        let mut config = TrainerConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.max_steps, 21);
        assert_eq!(config.feed_mode, FeedMode::Eager);
        assert_eq!(config.dropout, 0.25);

        let bad = config.apply_overrides(|key| (key == "VORTEX_SEED").then(|| "x".to_string()));
        assert!(matches!(bad, Err(TrainerError::InvalidConfig { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = TrainerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
