use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::models::{Order, RoutingDecision, ValidationError};

// ============================================================================
// Job Lifecycle Types
// ============================================================================
//
// A job wraps one order through its routing-and-dispatch attempt sequence.
// Valid transitions:
//
//   waiting -> active -> completed
//                     -> failed
//                     -> delayed -> waiting        (retryable failure)
//
// Completed and failed jobs are terminal and immutable; they stay in the
// job table for introspection.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Delayed => "delayed",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub order: Order,
    pub status: JobStatus,
    pub attempts_made: u32,
    pub enqueued_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub result: Option<RoutingDecision>,
}

impl Job {
    pub fn new(order: Order) -> Self {
        Self {
            id: Uuid::new_v4(),
            order,
            status: JobStatus::Waiting,
            attempts_made: 0,
            enqueued_at: Utc::now(),
            finished_at: None,
            last_error: None,
            result: None,
        }
    }
}

/// Introspection view of a job, the shape monitoring callers consume.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetails {
    pub id: Uuid,
    pub status: JobStatus,
    pub attempts_made: u32,
    pub order_number: String,
    pub enqueued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RoutingDecision>,
}

impl From<&Job> for JobDetails {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            attempts_made: job.attempts_made,
            order_number: job.order.order_number.clone(),
            enqueued_at: job.enqueued_at,
            finished_at: job.finished_at,
            last_error: job.last_error.clone(),
            result: job.result,
        }
    }
}

/// Counts per observable bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
    pub total: usize,
}

/// Outcome of an operator cancelling a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Removed,
    NotFound,
    /// The job already started (or finished); it cannot be pulled back.
    NotCancellable(JobStatus),
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("queue is shut down")]
    Closed,
}

/// Why an order could not be enqueued.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
