mod job;
mod processor;

pub use job::{CancelOutcome, EnqueueError, Job, JobDetails, JobStatus, QueueError, QueueStats};
pub use processor::QueueProcessor;
