use std::sync::Mutex;
use std::time::{Duration, Instant};

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Tracks consecutive failures against one downstream endpoint and blocks
// calls while it is presumed dead.
//
// States:
// - Closed: calls pass through, consecutive failures are counted
// - Open: calls are refused until the cooldown elapses
// - HalfOpen: calls are allowed again; enough successes close the circuit,
//   any failure reopens it
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used for the state gauge.
    pub fn as_code(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long an open circuit refuses calls before probing again
    pub cooldown: Duration,
    /// Successes required to close a half-open circuit
    pub close_after: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            close_after: 2,
        }
    }
}

#[derive(Debug)]
enum Inner {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::Closed { failures: 0 }),
        }
    }

    /// Whether a call may proceed right now. An open circuit whose cooldown
    /// has elapsed transitions to half-open and lets the call through as a
    /// probe.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match *inner {
            Inner::Closed { .. } | Inner::HalfOpen { .. } => true,
            Inner::Open { since } => {
                if since.elapsed() >= self.config.cooldown {
                    tracing::info!("circuit breaker cooldown elapsed, probing");
                    *inner = Inner::HalfOpen { successes: 0 };
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match *inner {
            Inner::Closed { ref mut failures } => *failures = 0,
            Inner::HalfOpen { ref mut successes } => {
                *successes += 1;
                if *successes >= self.config.close_after {
                    tracing::info!(successes = *successes, "circuit breaker closed");
                    *inner = Inner::Closed { failures: 0 };
                }
            }
            // A call admitted before the circuit opened can complete late.
            Inner::Open { .. } => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match *inner {
            Inner::Closed { ref mut failures } => {
                *failures += 1;
                if *failures >= self.config.failure_threshold {
                    tracing::warn!(failures = *failures, "circuit breaker opened");
                    *inner = Inner::Open {
                        since: Instant::now(),
                    };
                }
            }
            Inner::HalfOpen { .. } => {
                tracing::warn!("probe failed, circuit breaker reopened");
                *inner = Inner::Open {
                    since: Instant::now(),
                };
            }
            Inner::Open { ref mut since } => *since = Instant::now(),
        }
    }

    pub fn state(&self) -> CircuitState {
        match *self.lock() {
            Inner::Closed { .. } => CircuitState::Closed,
            Inner::Open { .. } => CircuitState::Open,
            Inner::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
