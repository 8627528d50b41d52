//! Tokio runtime executor configuration
//!
//! Keeps background preprocessing on its own runtime so CPU-heavy
//! producers never starve the control loop or signal handling.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::error::{Result, TrainerError};

/// Configuration for the trainer runtimes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Threads driving the orchestrator and signal handling
    pub control_threads: usize,
    /// Threads running background producers
    pub prefetch_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        Self {
            control_threads: 1,
            prefetch_threads: (cpus / 2).max(2),
        }
    }
}

/// Dual-runtime executor
pub struct TrainerRuntime {
    /// Orchestrator runtime
    control_runtime: Runtime,
    /// Producer runtime
    prefetch_runtime: Runtime,
    config: RuntimeConfig,
}

impl TrainerRuntime {
    /// Create a new runtime with the given configuration
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let control_runtime = Builder::new_multi_thread()
            .worker_threads(config.control_threads.max(1))
            .thread_name("vortex-control")
            .enable_all()
            .build()
            .map_err(|e| TrainerError::Internal {
                message: format!("Failed to create control runtime: {}", e),
            })?;

        let prefetch_runtime = Builder::new_multi_thread()
            .worker_threads(config.prefetch_threads.max(1))
            .thread_name("vortex-prefetch")
            .enable_all()
            .build()
            .map_err(|e| TrainerError::Internal {
                message: format!("Failed to create prefetch runtime: {}", e),
            })?;

        Ok(Self {
            control_runtime,
            prefetch_runtime,
            config,
        })
    }

    /// Run a future on the control runtime, blocking until complete
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.control_runtime.block_on(future)
    }

    /// Get the control runtime handle
    pub fn control_handle(&self) -> Handle {
        self.control_runtime.handle().clone()
    }

    /// Get the prefetch runtime handle
    pub fn prefetch_handle(&self) -> Handle {
        self.prefetch_runtime.handle().clone()
    }

    /// Runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Shut down both runtimes
    pub fn shutdown(self) {
        // Producers first, so none outlive the run
        self.prefetch_runtime
            .shutdown_timeout(Duration::from_secs(5));
        self.control_runtime.shutdown_background();
    }
}
