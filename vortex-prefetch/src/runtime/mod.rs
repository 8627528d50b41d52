//! Async runtime management
//!
//! Separate runtimes for the control loop and background producers, plus
//! interruption signalling.

pub mod executor;
pub mod shutdown;

pub use executor::{RuntimeConfig, TrainerRuntime};
pub use shutdown::ShutdownSignal;
