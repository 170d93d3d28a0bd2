//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use matchday_core::{JobId, LeagueId, LeagueSeasonKey};

use super::types::{CalculationJob, DeadLetterEntry, JobStatus};

/// Job store abstraction.
///
/// The store enforces the one-active-job-per-key invariant; the queue manager
/// serializes its read-modify-write sequences on top of it.
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails if the key already has an active job.
    fn insert(&self, job: CalculationJob) -> Result<(), JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<CalculationJob>, JobStoreError>;

    /// Replace a stored job.
    fn update(&self, job: &CalculationJob) -> Result<(), JobStoreError>;

    /// The pending, processing or failed job for `key`, if any.
    fn active_for(&self, key: LeagueSeasonKey) -> Result<Option<CalculationJob>, JobStoreError>;

    /// Claim the best ready job and mark it processing.
    /// Returns None if no jobs are ready.
    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<CalculationJob>, JobStoreError>;

    /// Jobs matching `filter`, newest submission first.
    fn list(&self, filter: &JobFilter, limit: usize) -> Result<Vec<CalculationJob>, JobStoreError>;

    /// Move a job to the dead-letter queue.
    fn dead_letter(
        &self,
        job: CalculationJob,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<(), JobStoreError>;

    /// Dead-lettered jobs, most recent first.
    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Remove a dead-lettered job and hand it back (for resubmission).
    fn take_dead_letter(&self, job_id: JobId) -> Result<DeadLetterEntry, JobStoreError>;

    /// Delete completed jobs that finished before `before`.
    fn prune_finished(&self, before: DateTime<Utc>) -> Result<usize, JobStoreError>;

    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("{0} already has an active job")]
    DuplicateActive(LeagueSeasonKey),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Selects jobs for listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub league_id: Option<LeagueId>,
    pub key: Option<LeagueSeasonKey>,
}

impl JobFilter {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn key(key: LeagueSeasonKey) -> Self {
        Self {
            key: Some(key),
            ..Self::default()
        }
    }

    fn matches(&self, job: &CalculationJob) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.league_id.is_none_or(|l| job.key.league_id == l)
            && self.key.is_none_or(|k| job.key == k)
    }
}

/// Job statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_letter: usize,
}

impl JobStats {
    /// Jobs that still have work ahead of them.
    pub fn active(&self) -> usize {
        self.pending + self.processing + self.failed
    }
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, CalculationJob>,
    active: HashMap<LeagueSeasonKey, JobId>,
    dead_letters: HashMap<JobId, DeadLetterEntry>,
}

impl Inner {
    fn index(&mut self, job: &CalculationJob) {
        if job.status.is_active() {
            self.active.insert(job.key, job.id);
        } else if self.active.get(&job.key) == Some(&job.id) {
            self.active.remove(&job.key);
        }
    }
}

/// In-memory job store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, JobStoreError> {
        self.inner
            .read()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, JobStoreError> {
        self.inner
            .write()
            .map_err(|_| JobStoreError::Storage("job store lock poisoned".into()))
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: CalculationJob) -> Result<(), JobStoreError> {
        let mut inner = self.write()?;
        if inner.jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        if job.status.is_active() && inner.active.contains_key(&job.key) {
            return Err(JobStoreError::DuplicateActive(job.key));
        }
        inner.index(&job);
        inner.jobs.insert(job.id, job);
        Ok(())
    }

    fn get(&self, job_id: JobId) -> Result<Option<CalculationJob>, JobStoreError> {
        Ok(self.read()?.jobs.get(&job_id).cloned())
    }

    fn update(&self, job: &CalculationJob) -> Result<(), JobStoreError> {
        let mut inner = self.write()?;
        if !inner.jobs.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        if job.status.is_active() && inner.active.get(&job.key).is_some_and(|id| *id != job.id) {
            return Err(JobStoreError::DuplicateActive(job.key));
        }
        inner.index(job);
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn active_for(&self, key: LeagueSeasonKey) -> Result<Option<CalculationJob>, JobStoreError> {
        let inner = self.read()?;
        Ok(inner.active.get(&key).and_then(|id| inner.jobs.get(id)).cloned())
    }

    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<CalculationJob>, JobStoreError> {
        let mut inner = self.write()?;

        // Only active jobs can be ready, so scanning the index is enough.
        let next = inner
            .active
            .values()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|job| job.is_ready(now))
            .min_by_key(|job| job.queue_rank())
            .map(|job| job.id);

        let Some(job_id) = next else {
            return Ok(None);
        };
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))?;
        job.mark_processing(now);
        Ok(Some(job.clone()))
    }

    fn list(&self, filter: &JobFilter, limit: usize) -> Result<Vec<CalculationJob>, JobStoreError> {
        let inner = self.read()?;
        let mut result: Vec<_> = inner
            .jobs
            .values()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect();

        result.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        result.truncate(limit);
        Ok(result)
    }

    fn dead_letter(
        &self,
        mut job: CalculationJob,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<(), JobStoreError> {
        let mut inner = self.write()?;

        job.status = JobStatus::DeadLetter;
        job.updated_at = at;

        inner.jobs.remove(&job.id);
        inner.index(&job);
        inner.dead_letters.insert(
            job.id,
            DeadLetterEntry {
                job,
                dead_lettered_at: at,
                reason,
            },
        );
        Ok(())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let inner = self.read()?;
        let mut result: Vec<_> = inner.dead_letters.values().cloned().collect();

        result.sort_by(|a, b| {
            b.dead_lettered_at
                .cmp(&a.dead_lettered_at)
                .then_with(|| b.job.sequence.cmp(&a.job.sequence))
        });
        result.truncate(limit);
        Ok(result)
    }

    fn take_dead_letter(&self, job_id: JobId) -> Result<DeadLetterEntry, JobStoreError> {
        self.write()?
            .dead_letters
            .remove(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))
    }

    fn prune_finished(&self, before: DateTime<Utc>) -> Result<usize, JobStoreError> {
        let mut inner = self.write()?;
        let before_len = inner.jobs.len();
        inner.jobs.retain(|_, job| {
            !(job.status == JobStatus::Completed && job.finished_at.is_some_and(|at| at < before))
        });
        Ok(before_len - inner.jobs.len())
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let inner = self.read()?;
        let mut stats = JobStats::default();

        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::DeadLetter => stats.dead_letter += 1,
            }
        }
        stats.dead_letter += inner.dead_letters.len();

        Ok(stats)
    }
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn insert(&self, job: CalculationJob) -> Result<(), JobStoreError> {
        (**self).insert(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<CalculationJob>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &CalculationJob) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn active_for(&self, key: LeagueSeasonKey) -> Result<Option<CalculationJob>, JobStoreError> {
        (**self).active_for(key)
    }

    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<CalculationJob>, JobStoreError> {
        (**self).claim_next(now)
    }

    fn list(&self, filter: &JobFilter, limit: usize) -> Result<Vec<CalculationJob>, JobStoreError> {
        (**self).list(filter, limit)
    }

    fn dead_letter(
        &self,
        job: CalculationJob,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason, at)
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(limit)
    }

    fn take_dead_letter(&self, job_id: JobId) -> Result<DeadLetterEntry, JobStoreError> {
        (**self).take_dead_letter(job_id)
    }

    fn prune_finished(&self, before: DateTime<Utc>) -> Result<usize, JobStoreError> {
        (**self).prune_finished(before)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats()
    }
}
