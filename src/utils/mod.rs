pub mod backoff;
pub mod circuit_breaker;

pub use backoff::{BackoffPolicy, IsTransient};
pub use circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitState};
