//! Recalculation job queue.
//!
//! - one active job per league-season, later requests merge or escalate
//! - priority order, then submission order
//! - retries with backoff, dead-letter queue after the budget is spent
//! - bounded worker pool with per-job timeouts
//!
//! `QueueManager` owns every state transition; `JobRunner` only does the work.

pub mod manager;
pub mod runner;
pub mod store;
pub mod types;

pub use manager::{ProcessSummary, QueueError, QueueHandle, QueueManager, QueueSettings, QueueStatus};
pub use runner::{JobRunner, RecalculationRunner, RunReport};
pub use store::{InMemoryJobStore, JobFilter, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, CalculationJob, DeadLetterEntry, ExecutionOutcome, ExecutionRecord, FollowUp,
    JobError, JobStatus, JobTrigger, Priority, RetryPolicy, SubmitDisposition, SubmitReceipt,
};
