use std::time::Duration;

// ============================================================================
// Exponential Backoff Schedule
// ============================================================================
//
// Jobs that fail a dispatch attempt are re-enqueued rather than retried in
// place, so the schedule only computes the delay before the next attempt;
// the attempt ceiling itself is enforced by the queue processor.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Ceiling on any single delay
    pub max_delay: Duration,
    /// Multiplier applied per additional attempt
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after `failed_attempts` attempts have failed, before
    /// the next one starts. The first retry waits `initial_delay`, each
    /// subsequent retry multiplies it, capped at `max_delay`.
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31);
        let millis =
            (self.initial_delay.as_millis() as f64) * self.multiplier.powi(exponent as i32);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Splits failures into those worth another attempt and those that will
/// never succeed no matter how often they are retried.
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}
