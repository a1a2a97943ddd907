use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
};
use std::time::Duration;

use crate::models::{Partner, RouteReason};

// ============================================================================
// Metrics - Prometheus metrics for observability
// ============================================================================
//
// Covers the full job lifecycle:
// - Intake (orders enqueued)
// - Outcomes (completed per partner/reason, failed, retries)
// - Dispatch calls (attempts, latency, circuit state per partner)
// - Counter-store failures (the fail-open path is invisible otherwise)
//
// All metrics are registered with one registry and scraped via /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub orders_enqueued: IntCounter,
    pub jobs_completed: IntCounterVec,
    pub jobs_failed: IntCounter,
    pub job_retries: IntCounter,
    pub capacity_fallbacks: IntCounter,

    pub dispatch_attempts: IntCounterVec,
    pub dispatch_duration: HistogramVec,
    pub circuit_state: IntGaugeVec,

    pub volume_store_errors: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_enqueued = IntCounter::new(
            "orders_enqueued_total",
            "Orders accepted into the routing queue",
        )?;
        registry.register(Box::new(orders_enqueued.clone()))?;

        let jobs_completed = IntCounterVec::new(
            Opts::new("jobs_completed_total", "Jobs dispatched successfully"),
            &["partner", "reason"],
        )?;
        registry.register(Box::new(jobs_completed.clone()))?;

        let jobs_failed = IntCounter::new(
            "jobs_failed_total",
            "Jobs that exhausted all dispatch attempts or failed permanently",
        )?;
        registry.register(Box::new(jobs_failed.clone()))?;

        let job_retries = IntCounter::new(
            "job_retries_total",
            "Dispatch attempts rescheduled after a retryable failure",
        )?;
        registry.register(Box::new(job_retries.clone()))?;

        let capacity_fallbacks = IntCounter::new(
            "capacity_fallback_total",
            "Orders rerouted because the preferred partner hit its daily cap",
        )?;
        registry.register(Box::new(capacity_fallbacks.clone()))?;

        let dispatch_attempts = IntCounterVec::new(
            Opts::new("dispatch_attempts_total", "Partner dispatch calls"),
            &["partner", "outcome"],
        )?;
        registry.register(Box::new(dispatch_attempts.clone()))?;

        let dispatch_duration = HistogramVec::new(
            HistogramOpts::new("dispatch_duration_seconds", "Partner dispatch call duration")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["partner"],
        )?;
        registry.register(Box::new(dispatch_duration.clone()))?;

        let circuit_state = IntGaugeVec::new(
            Opts::new(
                "dispatch_circuit_state",
                "Partner circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
            ),
            &["partner"],
        )?;
        registry.register(Box::new(circuit_state.clone()))?;

        let volume_store_errors = IntCounterVec::new(
            Opts::new(
                "volume_store_errors_total",
                "Counter-store operations that failed and fell open",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(volume_store_errors.clone()))?;

        Ok(Self {
            registry,
            orders_enqueued,
            jobs_completed,
            jobs_failed,
            job_retries,
            capacity_fallbacks,
            dispatch_attempts,
            dispatch_duration,
            circuit_state,
            volume_store_errors,
        })
    }

    /// Registry handle for the /metrics exposition route.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_completed(&self, partner: Partner, reason: RouteReason) {
        self.jobs_completed
            .with_label_values(&[partner.as_str(), reason.as_str()])
            .inc();
    }

    pub fn record_dispatch(&self, partner: Partner, elapsed: Duration, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.dispatch_attempts
            .with_label_values(&[partner.as_str(), outcome])
            .inc();
        self.dispatch_duration
            .with_label_values(&[partner.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_volume_store_error(&self, operation: &str) {
        self.volume_store_errors
            .with_label_values(&[operation])
            .inc();
    }

    pub fn set_circuit_state(&self, partner: Partner, code: u8) {
        self.circuit_state
            .with_label_values(&[partner.as_str()])
            .set(code as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_completed() {
        let metrics = Metrics::new().unwrap();
        metrics.record_completed(Partner::F2, RouteReason::SingleItemDefault);
        metrics.record_completed(Partner::F1, RouteReason::CapacityFallback);

        let gathered = metrics.registry.gather();
        let completed = gathered
            .iter()
            .find(|m| m.name() == "jobs_completed_total")
            .unwrap();
        assert_eq!(completed.metric.len(), 2);
    }

    #[test]
    fn test_record_dispatch_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_dispatch(Partner::F3, Duration::from_millis(50), true);
        metrics.record_dispatch(Partner::F3, Duration::from_millis(80), false);

        let gathered = metrics.registry.gather();
        let attempts = gathered
            .iter()
            .find(|m| m.name() == "dispatch_attempts_total")
            .unwrap();
        // One series per outcome label
        assert_eq!(attempts.metric.len(), 2);
    }

    #[test]
    fn test_circuit_state_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.set_circuit_state(Partner::FUs, 1);

        let gathered = metrics.registry.gather();
        let state = gathered
            .iter()
            .find(|m| m.name() == "dispatch_circuit_state")
            .unwrap();
        assert_eq!(state.metric[0].gauge.value, Some(1.0));
    }
}
