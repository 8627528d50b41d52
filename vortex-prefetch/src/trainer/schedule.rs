//! Step cadences for display and checkpoint requests

/// Fires on every step divisible by its interval, step 0 included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    interval: u64,
}

impl Cadence {
    /// Create a cadence. An interval of zero is treated as one.
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
        }
    }

    /// Check if the cadence is due at this step
    pub fn is_due(&self, step: u64) -> bool {
        step % self.interval == 0
    }

    /// Interval in steps
    pub fn interval(&self) -> u64 {
        self.interval
    }
}
