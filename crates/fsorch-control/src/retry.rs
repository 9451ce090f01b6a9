//! Exponential backoff for transient reconciliation failures.
//!
//! The reconciler does not sleep itself: a pass that hits a transient error
//! reports the delay before the next attempt and lets the caller own timing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff settings for pool and metadata provisioning retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry, in milliseconds.
    pub initial_ms: u64,
    /// Multiplier applied per attempt.
    pub multiplier: f64,
    /// Delay cap, in milliseconds.
    pub max_ms: u64,
    /// Transient failures tolerated before the filesystem goes Failed.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 100,
            multiplier: 2.0,
            max_ms: 10_000,
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry `attempt` (zero-based), capped at `max_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let computed = self.initial_ms as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis(computed.min(self.max_ms as f64) as u64)
    }

    /// Whether the retry budget is spent.
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
