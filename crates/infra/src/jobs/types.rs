//! Recalculation jobs, their lifecycle and retry policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use matchday_core::{JobId, LeagueSeasonKey, MatchId, SnapshotId};
use matchday_standings::CalculationError;

use crate::error::StoreError;
use crate::snapshots::SnapshotError;

/// Scheduling priority. Declaration order is rank order (`High` is greatest).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// Job execution status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up
    Pending,
    /// Currently being executed
    Processing,
    /// Completed successfully
    Completed,
    /// Failed, waiting for its next attempt
    Failed,
    /// Exhausted retries or failed permanently
    DeadLetter,
}

impl JobStatus {
    /// Active jobs count toward the one-per-key limit.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing | JobStatus::Failed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::DeadLetter)
    }
}

/// What caused a recalculation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobTrigger {
    MatchFinished { match_id: MatchId },
    MatchCorrected { match_id: MatchId },
    /// A finished match went back to a non-finished status.
    MatchReopened { match_id: MatchId },
    MatchDeleted { match_id: MatchId },
    Manual { description: Option<String> },
    Resubmitted { original: JobId },
}

/// Growth of the wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    /// `base * failures`
    Linear,
    /// `base * 2^(failures - 1)`
    #[default]
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Failed attempts after which a job is dead-lettered.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Upper bound for any single wait.
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_retries: u32) -> Self {
        Self::fixed(max_retries, Duration::ZERO)
    }

    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Wait before the attempt that follows `failures` failed ones.
    pub fn backoff(&self, failures: u32) -> Duration {
        let delay = match (self.strategy, failures) {
            (_, 0) => Duration::ZERO,
            (BackoffStrategy::Fixed, _) => self.base_delay,
            (BackoffStrategy::Linear, n) => self.base_delay.saturating_mul(n),
            (BackoffStrategy::Exponential, n) => {
                let factor = 1u32.checked_shl(n - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }

    pub fn allows_retry(&self, failures: u32) -> bool {
        failures < self.max_retries
    }
}

/// Recorded when a submission arrives for a key whose job is already running.
///
/// Keeps the highest requested priority and the most recent trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    pub priority: Priority,
    pub trigger: JobTrigger,
}

/// A recalculation request for one league+season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationJob {
    pub id: JobId,
    pub key: LeagueSeasonKey,
    pub priority: Priority,
    pub status: JobStatus,
    pub trigger: JobTrigger,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Submission order; FIFO tie-break within a priority.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Earliest time the next attempt may start.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub follow_up: Option<FollowUp>,
}

impl CalculationJob {
    pub fn new(
        key: LeagueSeasonKey,
        priority: Priority,
        trigger: JobTrigger,
        sequence: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            key,
            priority,
            status: JobStatus::Pending,
            trigger,
            retry_count: 0,
            sequence,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            next_attempt_at: None,
            last_error: None,
            follow_up: None,
        }
    }

    /// Check if the job can be claimed at `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Failed)
            && self.next_attempt_at.is_none_or(|at| now >= at)
    }

    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        self.next_attempt_at = None;
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(now);
        self.last_error = None;
        self.updated_at = now;
    }

    /// Record a failed attempt. Returns `true` when the job gets another attempt.
    pub fn mark_failed(
        &mut self,
        error: String,
        retriable: bool,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> bool {
        self.retry_count += 1;
        self.last_error = Some(error);
        self.updated_at = now;

        if retriable && policy.allows_retry(self.retry_count) {
            let delay = policy.backoff(self.retry_count);
            self.status = JobStatus::Failed;
            self.next_attempt_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            true
        } else {
            self.status = JobStatus::DeadLetter;
            self.finished_at = Some(now);
            self.next_attempt_at = None;
            false
        }
    }

    /// Queue ordering: higher priority first, then submission order.
    pub fn queue_rank(&self) -> (core::cmp::Reverse<Priority>, u64) {
        (core::cmp::Reverse(self.priority), self.sequence)
    }
}

/// Failure of one job execution.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("calculation failed: {0}")]
    Calculation(#[from] CalculationError),

    #[error("snapshot failed: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("job exceeded its {0:?} time budget")]
    Timeout(Duration),

    #[error("job runner panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Transient failures are retried. Calculation errors and runner panics
    /// come from the data or the code, so another attempt would fail the same way.
    pub fn is_retriable(&self) -> bool {
        match self {
            JobError::Store(_) | JobError::Timeout(_) => true,
            JobError::Snapshot(e) => e.is_transient(),
            JobError::Calculation(_) | JobError::Panicked(_) => false,
        }
    }
}

/// How `submit` handled a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitDisposition {
    /// A new pending job was created.
    Created,
    /// An existing waiting job was raised to the requested priority.
    Escalated,
    /// An existing waiting job already covers the request.
    Merged,
    /// The key's job is running; a fresh job follows once it finishes.
    FollowUpScheduled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// The job that will (re)calculate the key.
    pub job_id: JobId,
    pub key: LeagueSeasonKey,
    pub priority: Priority,
    pub disposition: SubmitDisposition,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded,
    Retrying,
    DeadLettered,
}

/// One execution attempt, kept in the bounded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub job_id: JobId,
    pub key: LeagueSeasonKey,
    pub priority: Priority,
    pub trigger: JobTrigger,
    /// 1-based attempt number.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: ExecutionOutcome,
    pub error: Option<String>,
    /// Pre-calculation snapshot taken by this attempt.
    pub snapshot_id: Option<SnapshotId>,
}

/// Entry in the dead-letter queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: CalculationJob,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchday_core::{LeagueId, SeasonId};

    fn key() -> LeagueSeasonKey {
        LeagueSeasonKey::new(LeagueId::new(), SeasonId::new())
    }

    #[test]
    fn exponential_wait_doubles_until_the_cap() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(1),
            strategy: BackoffStrategy::Exponential,
        };

        let waits: Vec<u64> = (0..5).map(|n| policy.backoff(n).as_millis() as u64).collect();
        assert_eq!(waits, vec![0, 250, 500, 1000, 1000]);
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn linear_and_fixed_waits() {
        let linear = RetryPolicy {
            strategy: BackoffStrategy::Linear,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(linear.backoff(2), Duration::from_secs(4));
        assert_eq!(linear.backoff(3), Duration::from_secs(5));

        let fixed = RetryPolicy::fixed(3, Duration::from_secs(7));
        assert_eq!(fixed.backoff(1), fixed.backoff(3));
    }

    #[test]
    fn retry_budget_counts_failed_attempts() {
        let policy = RetryPolicy::immediate(2);
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
        assert!(!RetryPolicy::immediate(0).allows_retry(0));
    }

    #[test]
    fn priority_orders_high_first_then_fifo() {
        let now = Utc::now();
        let low = CalculationJob::new(key(), Priority::Low, JobTrigger::Manual { description: None }, 1, now);
        let high = CalculationJob::new(key(), Priority::High, JobTrigger::Manual { description: None }, 3, now);
        let normal_early = CalculationJob::new(key(), Priority::Normal, JobTrigger::Manual { description: None }, 2, now);
        let normal_late = CalculationJob::new(key(), Priority::Normal, JobTrigger::Manual { description: None }, 4, now);

        let mut jobs = vec![&low, &normal_late, &high, &normal_early];
        jobs.sort_by_key(|j| j.queue_rank());
        let order: Vec<u64> = jobs.iter().map(|j| j.sequence).collect();
        assert_eq!(order, vec![3, 2, 4, 1]);
    }

    #[test]
    fn failure_schedules_retry_then_dead_letters() {
        let now = Utc::now();
        let policy = RetryPolicy::fixed(2, Duration::from_secs(5));
        let mut job = CalculationJob::new(key(), Priority::Normal, JobTrigger::Manual { description: None }, 1, now);

        job.mark_processing(now);
        assert!(job.mark_failed("boom".into(), true, &policy, now));
        assert_eq!(job.status, JobStatus::Failed);
        assert!(!job.is_ready(now));
        assert!(job.is_ready(now + chrono::Duration::seconds(5)));

        job.mark_processing(now);
        assert!(!job.mark_failed("boom again".into(), true, &policy, now));
        assert_eq!(job.status, JobStatus::DeadLetter);
        assert_eq!(job.retry_count, 2);
        assert_eq!(job.last_error.as_deref(), Some("boom again"));
    }

    #[test]
    fn permanent_failure_dead_letters_immediately() {
        let now = Utc::now();
        let mut job = CalculationJob::new(key(), Priority::Normal, JobTrigger::Manual { description: None }, 1, now);
        assert!(!job.mark_failed("bad data".into(), false, &RetryPolicy::default(), now));
        assert_eq!(job.status, JobStatus::DeadLetter);
    }

    #[test]
    fn calculation_errors_are_not_retriable() {
        let err = JobError::Calculation(CalculationError::MissingScore {
            match_id: MatchId::new(),
        });
        assert!(!err.is_retriable());
        assert!(JobError::Timeout(Duration::from_secs(1)).is_retriable());
        assert!(JobError::Store(StoreError::Unavailable("down".into())).is_retriable());
    }
}
