use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::job::{
    CancelOutcome, EnqueueError, Job, JobDetails, JobStatus, QueueError, QueueStats,
};
use crate::dispatch::{DispatchError, DispatchReceipt, PartnerDispatcher};
use crate::metrics::Metrics;
use crate::models::{Order, RouteReason, RoutingDecision, ValidationError};
use crate::routing::{RoutingService, FALLBACK_PARTNER};
use crate::utils::{BackoffPolicy, IsTransient};

// ============================================================================
// Capacity-Aware Queue Processor
// ============================================================================
//
// Owns the job table and the work channel. Enqueueing never waits on a
// partner; workers pull job ids off the shared channel (one receiver, so
// no two workers ever hold the same job), route the order, apply the
// capacity fallback, dispatch, and record the outcome. Retryable failures
// park the job in `delayed` and re-enqueue it after exponential backoff.
//
// ============================================================================

/// What went wrong while processing one attempt. Validation failures can
/// never be fixed by retrying; dispatch failures can.
#[derive(Debug, thiserror::Error)]
enum ProcessError {
    #[error("invalid order: {0}")]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl IsTransient for ProcessError {
    fn is_transient(&self) -> bool {
        matches!(self, ProcessError::Dispatch(_))
    }
}

pub struct QueueProcessor {
    routing: Arc<RoutingService>,
    dispatcher: Arc<dyn PartnerDispatcher>,
    metrics: Arc<Metrics>,
    jobs: RwLock<HashMap<Uuid, Job>>,
    tx: mpsc::UnboundedSender<Uuid>,
    rx: Mutex<mpsc::UnboundedReceiver<Uuid>>,
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl QueueProcessor {
    pub fn new(
        routing: Arc<RoutingService>,
        dispatcher: Arc<dyn PartnerDispatcher>,
        metrics: Arc<Metrics>,
        max_attempts: u32,
        backoff: BackoffPolicy,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            routing,
            dispatcher,
            metrics,
            jobs: RwLock::new(HashMap::new()),
            tx,
            rx: Mutex::new(rx),
            max_attempts: max_attempts.max(1),
            backoff,
        })
    }

    /// Validate and enqueue an order, returning the job id immediately.
    /// Dispatch happens later on a worker; enqueueing never blocks on
    /// partner health.
    pub fn add_order(&self, order: Order) -> Result<Uuid, EnqueueError> {
        order.validate().map_err(EnqueueError::Invalid)?;

        let job = Job::new(order);
        let job_id = job.id;
        let order_number = job.order.order_number.clone();
        {
            let mut jobs = self.write_jobs()?;
            jobs.insert(job_id, job);
        }

        if self.tx.send(job_id).is_err() {
            if let Ok(mut jobs) = self.write_jobs() {
                jobs.remove(&job_id);
            }
            return Err(EnqueueError::Queue(QueueError::Closed));
        }

        self.metrics.orders_enqueued.inc();
        tracing::info!(job_id = %job_id, order_number = %order_number, "order enqueued");
        Ok(job_id)
    }

    /// Spawn the worker tasks that drain the queue.
    pub fn start_workers(self: Arc<Self>, count: usize) -> Vec<JoinHandle<()>> {
        (0..count)
            .map(|worker| {
                let processor = self.clone();
                tokio::spawn(async move { processor.worker_loop(worker).await })
            })
            .collect()
    }

    async fn worker_loop(self: Arc<Self>, worker: usize) {
        tracing::debug!(worker, "queue worker started");
        loop {
            // Holding the receiver lock across recv makes dequeue
            // exclusive: exactly one worker gets each job id.
            let next = { self.rx.lock().await.recv().await };
            match next {
                Some(job_id) => self.clone().process_job(job_id).await,
                None => {
                    tracing::debug!(worker, "queue channel closed, worker exiting");
                    break;
                }
            }
        }
    }

    /// Run one attempt for a job. Each call claims the job, routes,
    /// applies the capacity fallback, dispatches, and records the outcome.
    pub async fn process_job(self: Arc<Self>, job_id: Uuid) {
        let claimed = match self.jobs.write() {
            Ok(mut jobs) => jobs.get_mut(&job_id).map(|job| {
                job.status = JobStatus::Active;
                job.attempts_made += 1;
                (job.order.clone(), job.attempts_made)
            }),
            Err(_) => {
                tracing::error!(job_id = %job_id, "job table lock poisoned, dropping attempt");
                return;
            }
        };
        let Some((order, attempt)) = claimed else {
            // Removed by the operator while it sat in the channel.
            tracing::debug!(job_id = %job_id, "job no longer present, skipping");
            return;
        };

        tracing::debug!(
            job_id = %job_id,
            order_number = %order.order_number,
            attempt,
            "processing job"
        );

        match self.run_attempt(&order).await {
            Ok((decision, _receipt)) => {
                // Count volume only for the partner that actually received
                // the order, and only now that it has.
                self.routing.increment_volume(decision.partner).await;
                self.metrics.record_completed(decision.partner, decision.reason);
                tracing::info!(
                    job_id = %job_id,
                    order_number = %order.order_number,
                    partner = %decision.partner,
                    reason = %decision.reason,
                    attempt,
                    "✅ order routed and dispatched"
                );
                self.finish_job(job_id, JobStatus::Completed, None, Some(decision));
            }
            Err(err) if err.is_transient() && attempt < self.max_attempts => {
                let delay = self.backoff.delay_after(attempt);
                tracing::warn!(
                    job_id = %job_id,
                    order_number = %order.order_number,
                    attempt,
                    max_attempts = self.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "dispatch failed, job delayed for retry"
                );
                self.metrics.job_retries.inc();
                self.mark_delayed(job_id, err.to_string());

                let processor = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    processor.requeue(job_id);
                });
            }
            Err(err) => {
                tracing::error!(
                    job_id = %job_id,
                    order_number = %order.order_number,
                    attempt,
                    error = %err,
                    "❌ job failed permanently"
                );
                self.metrics.jobs_failed.inc();
                self.finish_job(job_id, JobStatus::Failed, Some(err.to_string()), None);
            }
        }
    }

    async fn run_attempt(
        &self,
        order: &Order,
    ) -> Result<(RoutingDecision, DispatchReceipt), ProcessError> {
        order.validate()?;

        let mut decision = self.routing.determine_partner(order);
        if self.routing.is_at_capacity(decision.partner).await {
            // Single-level fallback: the overflow partner is unlimited by
            // configuration, so no further search is needed.
            tracing::info!(
                order_number = %order.order_number,
                preferred = %decision.partner,
                fallback = %FALLBACK_PARTNER,
                "partner at daily cap, rerouting"
            );
            self.metrics.capacity_fallbacks.inc();
            decision = RoutingDecision {
                partner: FALLBACK_PARTNER,
                reason: RouteReason::CapacityFallback,
            };
        }

        let started = Instant::now();
        let result = self.dispatcher.dispatch(decision.partner, order).await;
        self.metrics
            .record_dispatch(decision.partner, started.elapsed(), result.is_ok());

        let receipt = result?;
        Ok((decision, receipt))
    }

    /// Flip a delayed job back to waiting and hand it to the workers.
    fn requeue(&self, job_id: Uuid) {
        let should_send = match self.jobs.write() {
            Ok(mut jobs) => match jobs.get_mut(&job_id) {
                Some(job) if job.status == JobStatus::Delayed => {
                    job.status = JobStatus::Waiting;
                    true
                }
                Some(job) => {
                    tracing::debug!(job_id = %job_id, status = %job.status, "not requeueing");
                    false
                }
                None => {
                    tracing::debug!(job_id = %job_id, "delayed job was removed, not requeueing");
                    false
                }
            },
            Err(_) => {
                tracing::error!(job_id = %job_id, "job table lock poisoned, retry dropped");
                false
            }
        };

        if should_send && self.tx.send(job_id).is_err() {
            tracing::error!(job_id = %job_id, "queue channel closed, job left waiting");
        }
    }

    fn mark_delayed(&self, job_id: Uuid, error: String) {
        match self.jobs.write() {
            Ok(mut jobs) => {
                if let Some(job) = jobs.get_mut(&job_id) {
                    job.status = JobStatus::Delayed;
                    job.last_error = Some(error);
                }
            }
            Err(_) => {
                tracing::error!(job_id = %job_id, "job table lock poisoned, delay not recorded");
            }
        }
    }

    fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<String>,
        result: Option<RoutingDecision>,
    ) {
        match self.jobs.write() {
            Ok(mut jobs) => {
                if let Some(job) = jobs.get_mut(&job_id) {
                    job.status = status;
                    job.finished_at = Some(Utc::now());
                    if error.is_some() {
                        job.last_error = error;
                    }
                    job.result = result;
                }
            }
            Err(_) => {
                tracing::error!(job_id = %job_id, "job table lock poisoned, outcome not recorded");
            }
        }
    }

    /// Counts per status bucket for monitoring. Degrades to a structured
    /// error instead of panicking if the job table is unusable.
    pub fn queue_stats(&self) -> Result<QueueStats, QueueError> {
        let jobs = self.read_jobs()?;
        let mut stats = QueueStats {
            total: jobs.len(),
            ..Default::default()
        };
        for job in jobs.values() {
            match job.status {
                JobStatus::Waiting => stats.waiting += 1,
                JobStatus::Active => stats.active += 1,
                JobStatus::Delayed => stats.delayed += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    pub fn job_details(&self, job_id: Uuid) -> Result<Option<JobDetails>, QueueError> {
        let jobs = self.read_jobs()?;
        Ok(jobs.get(&job_id).map(JobDetails::from))
    }

    /// Operator cancellation: a job can be pulled back any time before a
    /// worker picks it up. Active attempts run to completion.
    pub fn remove_waiting_job(&self, job_id: Uuid) -> Result<CancelOutcome, QueueError> {
        let mut jobs = self.write_jobs()?;
        match jobs.get(&job_id).map(|job| job.status) {
            None => Ok(CancelOutcome::NotFound),
            Some(JobStatus::Waiting) | Some(JobStatus::Delayed) => {
                jobs.remove(&job_id);
                tracing::info!(job_id = %job_id, "job removed before dispatch");
                Ok(CancelOutcome::Removed)
            }
            Some(status) => Ok(CancelOutcome::NotCancellable(status)),
        }
    }

    fn read_jobs(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<Uuid, Job>>, QueueError> {
        self.jobs
            .read()
            .map_err(|_| QueueError::StoreUnavailable("job table lock poisoned".to_string()))
    }

    fn write_jobs(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Job>>, QueueError> {
        self.jobs
            .write()
            .map_err(|_| QueueError::StoreUnavailable("job table lock poisoned".to_string()))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
