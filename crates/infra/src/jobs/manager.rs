//! Queue manager: deduplicated submission, priority dispatch to a bounded
//! worker pool, retries with backoff, dead-lettering and metrics.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{Notify, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use matchday_core::{Clock, JobId, LeagueId, LeagueSeasonKey};

use super::runner::{JobRunner, RunReport};
use super::store::{JobFilter, JobStats, JobStore, JobStoreError};
use super::types::{
    CalculationJob, DeadLetterEntry, ExecutionOutcome, ExecutionRecord, FollowUp, JobError,
    JobStatus, JobTrigger, Priority, RetryPolicy, SubmitDisposition, SubmitReceipt,
};
use crate::audit::{AuditAction, AuditEntry, AuditSink};
use crate::config::AutomationConfig;

/// Queue manager configuration.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Worker pool size
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Wall-clock budget per execution
    pub job_timeout: Duration,
    /// Execution records kept in memory
    pub history_limit: usize,
    pub finished_job_retention: chrono::Duration,
    /// Idle wake-up for background workers
    pub poll_interval: Duration,
    pub maintenance_interval: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from(&AutomationConfig::default())
    }
}

impl From<&AutomationConfig> for QueueSettings {
    fn from(config: &AutomationConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            retry: config.retry_policy(),
            job_timeout: config.job_timeout(),
            history_limit: config.history_limit,
            finished_job_retention: config.finished_job_retention(),
            poll_interval: config.poll_interval(),
            maintenance_interval: config.maintenance_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error("queue state lock poisoned")]
    Poisoned,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    /// Jobs waiting to run (pending plus failed-awaiting-retry).
    pub depth: usize,
    pub pending: usize,
    pub processing: usize,
    pub failed: usize,
    pub completed: usize,
    pub dead_letter: usize,
    pub executions: u64,
    /// None until something has run.
    pub average_processing_ms: Option<f64>,
    pub success_rate: Option<f64>,
    pub paused: bool,
    pub concurrency: usize,
}

/// Totals for one `process_queue` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub executed: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

impl ProcessSummary {
    fn record(&mut self, outcome: ExecutionOutcome) {
        self.executed += 1;
        match outcome {
            ExecutionOutcome::Succeeded => self.succeeded += 1,
            ExecutionOutcome::Retrying => self.retried += 1,
            ExecutionOutcome::DeadLettered => self.dead_lettered += 1,
        }
    }

    fn merge(&mut self, other: ProcessSummary) {
        self.executed += other.executed;
        self.succeeded += other.succeeded;
        self.retried += other.retried;
        self.dead_lettered += other.dead_lettered;
    }
}

#[derive(Debug, Default)]
struct QueueState {
    next_sequence: u64,
    history: VecDeque<ExecutionRecord>,
    executions: u64,
    succeeded: u64,
    total_duration_ms: u64,
}

/// Owns all queue bookkeeping. Workers never touch the job store directly;
/// every transition goes through the manager under `state`.
pub struct QueueManager {
    store: Arc<dyn JobStore>,
    runner: Arc<dyn JobRunner>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    settings: QueueSettings,
    state: Mutex<QueueState>,
    wakeup: Notify,
    idle: Notify,
    paused: AtomicBool,
}

impl QueueManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        runner: Arc<dyn JobRunner>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            store,
            runner,
            audit,
            clock,
            settings,
            state: Mutex::new(QueueState::default()),
            wakeup: Notify::new(),
            idle: Notify::new(),
            paused: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, QueueState>, QueueError> {
        self.state.lock().map_err(|_| QueueError::Poisoned)
    }

    /// Request a recalculation of `key`.
    ///
    /// At most one active job exists per key:
    /// - waiting job: a higher priority escalates it in place, anything else merges;
    /// - running job: a follow-up is recorded and queued when the run ends;
    /// - no active job: a new pending job is created.
    pub fn submit(
        &self,
        key: LeagueSeasonKey,
        priority: Priority,
        trigger: JobTrigger,
    ) -> Result<SubmitReceipt, QueueError> {
        let mut state = self.lock_state()?;
        let receipt = self.submit_locked(&mut state, key, priority, trigger)?;
        drop(state);

        if receipt.disposition != SubmitDisposition::Merged {
            self.wakeup.notify_waiters();
        }
        Ok(receipt)
    }

    fn submit_locked(
        &self,
        state: &mut QueueState,
        key: LeagueSeasonKey,
        priority: Priority,
        trigger: JobTrigger,
    ) -> Result<SubmitReceipt, QueueError> {
        let now = self.clock.now();

        let (job_id, priority, disposition) = match self.store.active_for(key)? {
            Some(mut job) if job.status == JobStatus::Processing => {
                let follow_up = match job.follow_up.take() {
                    Some(existing) => FollowUp {
                        priority: existing.priority.max(priority),
                        trigger,
                    },
                    None => FollowUp { priority, trigger },
                };
                let follow_priority = follow_up.priority;
                job.follow_up = Some(follow_up);
                job.updated_at = now;
                self.store.update(&job)?;
                (job.id, follow_priority, SubmitDisposition::FollowUpScheduled)
            }
            Some(mut job) if priority > job.priority => {
                job.priority = priority;
                job.updated_at = now;
                self.store.update(&job)?;
                (job.id, priority, SubmitDisposition::Escalated)
            }
            Some(job) => (job.id, job.priority, SubmitDisposition::Merged),
            None => {
                state.next_sequence += 1;
                let job = CalculationJob::new(key, priority, trigger, state.next_sequence, now);
                let job_id = job.id;
                self.store.insert(job)?;
                (job_id, priority, SubmitDisposition::Created)
            }
        };

        let action = match disposition {
            SubmitDisposition::Created => AuditAction::JobSubmitted,
            SubmitDisposition::Escalated => AuditAction::JobEscalated,
            SubmitDisposition::Merged => AuditAction::JobMerged,
            SubmitDisposition::FollowUpScheduled => AuditAction::JobFollowUpScheduled,
        };
        self.audit
            .record(AuditEntry::new(now, action, key).job(job_id).detail(format!("{priority:?}")));
        debug!(job_id = %job_id, key = %key, ?priority, ?disposition, "recalculation requested");

        Ok(SubmitReceipt {
            job_id,
            key,
            priority,
            disposition,
        })
    }

    fn claim(&self) -> Result<Option<CalculationJob>, QueueError> {
        let _state = self.lock_state()?;
        Ok(self.store.claim_next(self.clock.now())?)
    }

    /// Run a claimed job under the timeout and record the outcome.
    ///
    /// Returns None only if the outcome could not be recorded.
    async fn execute(&self, job: CalculationJob) -> Option<ExecutionOutcome> {
        let started_at = job.started_at.unwrap_or_else(|| self.clock.now());
        self.audit
            .record(AuditEntry::new(started_at, AuditAction::JobStarted, job.key).job(job.id));
        debug!(job_id = %job.id, key = %job.key, attempt = job.retry_count + 1, "job started");

        let timer = Instant::now();
        let run = AssertUnwindSafe(self.runner.run(&job)).catch_unwind();
        let result = match tokio::time::timeout(self.settings.job_timeout, run).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => {
                let message = panic_message(payload.as_ref());
                error!(job_id = %job.id, key = %job.key, panic = %message, "job runner panicked");
                Err(JobError::Panicked(message))
            }
            Err(_) => Err(JobError::Timeout(self.settings.job_timeout)),
        };
        let duration_ms = timer.elapsed().as_millis() as u64;

        let job_id = job.id;
        let outcome = self.finish(job, result, started_at, duration_ms);
        self.idle.notify_waiters();

        match outcome {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                error!(job_id = %job_id, error = %err, "failed to record job outcome");
                None
            }
        }
    }

    fn finish(
        &self,
        claimed: CalculationJob,
        result: Result<RunReport, JobError>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Result<ExecutionOutcome, QueueError> {
        let now = self.clock.now();
        let mut state = self.lock_state()?;

        // Submissions during the run may have attached a follow-up.
        let mut job = self.store.get(claimed.id)?.unwrap_or(claimed);
        let follow_up = job.follow_up.take();
        let attempt = job.retry_count + 1;

        let (outcome, error, snapshot_id) = match result {
            Ok(report) => {
                job.mark_completed(now);
                self.store.update(&job)?;
                info!(
                    job_id = %job.id,
                    key = %job.key,
                    duration_ms,
                    rows = report.rows,
                    "job completed"
                );
                self.audit
                    .record(AuditEntry::new(now, AuditAction::JobCompleted, job.key).job(job.id));
                (ExecutionOutcome::Succeeded, None, report.snapshot_id)
            }
            Err(err) => {
                let message = err.to_string();
                if job.mark_failed(message.clone(), err.is_retriable(), &self.settings.retry, now) {
                    // The retry reads fresh data, so it also covers the follow-up.
                    if let Some(f) = &follow_up {
                        job.priority = job.priority.max(f.priority);
                    }
                    self.store.update(&job)?;
                    warn!(
                        job_id = %job.id,
                        key = %job.key,
                        retry_count = job.retry_count,
                        next_attempt_at = ?job.next_attempt_at,
                        error = %message,
                        "job failed; retry scheduled"
                    );
                    self.audit.record(
                        AuditEntry::new(now, AuditAction::JobFailed, job.key)
                            .job(job.id)
                            .detail(message.clone()),
                    );
                    (ExecutionOutcome::Retrying, Some(message), None)
                } else {
                    error!(
                        job_id = %job.id,
                        key = %job.key,
                        retry_count = job.retry_count,
                        created_at = %job.created_at,
                        retriable = err.is_retriable(),
                        error = %message,
                        "job dead-lettered"
                    );
                    self.store.dead_letter(job.clone(), message.clone(), now)?;
                    self.audit.record(
                        AuditEntry::new(now, AuditAction::JobDeadLettered, job.key)
                            .job(job.id)
                            .detail(message.clone()),
                    );
                    (ExecutionOutcome::DeadLettered, Some(message), None)
                }
            }
        };

        if let Some(follow_up) = follow_up.filter(|_| outcome != ExecutionOutcome::Retrying) {
            state.next_sequence += 1;
            let next = CalculationJob::new(
                job.key,
                follow_up.priority,
                follow_up.trigger,
                state.next_sequence,
                now,
            );
            let next_id = next.id;
            self.store.insert(next)?;
            self.audit.record(
                AuditEntry::new(now, AuditAction::JobSubmitted, job.key)
                    .job(next_id)
                    .detail(format!("follow-up of {}", job.id)),
            );
            debug!(job_id = %next_id, after = %job.id, "follow-up job queued");
        }

        state.executions += 1;
        state.total_duration_ms += duration_ms;
        if outcome == ExecutionOutcome::Succeeded {
            state.succeeded += 1;
        }
        state.history.push_back(ExecutionRecord {
            job_id: job.id,
            key: job.key,
            priority: job.priority,
            trigger: job.trigger.clone(),
            attempt,
            started_at,
            finished_at: now,
            duration_ms,
            outcome,
            error,
            snapshot_id,
        });
        while state.history.len() > self.settings.history_limit {
            state.history.pop_front();
        }
        drop(state);

        self.wakeup.notify_waiters();
        Ok(outcome)
    }

    /// Drain every ready job through `concurrency` workers and return when
    /// nothing is ready any more. Retries scheduled in the future are left
    /// for a later call (or for the background workers).
    pub async fn process_queue(self: &Arc<Self>) -> ProcessSummary {
        let mut workers = JoinSet::new();
        for worker in 0..self.settings.concurrency {
            let manager = Arc::clone(self);
            workers.spawn(async move { manager.drain(worker).await });
        }

        let mut summary = ProcessSummary::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(partial) => summary.merge(partial),
                Err(err) => error!(error = %err, "queue worker panicked"),
            }
        }
        summary
    }

    async fn drain(&self, worker: usize) -> ProcessSummary {
        let mut summary = ProcessSummary::default();
        while !self.is_paused() {
            match self.claim() {
                Ok(Some(job)) => {
                    if let Some(outcome) = self.execute(job).await {
                        summary.record(outcome);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    error!(worker, error = %err, "failed to claim job");
                    break;
                }
            }
        }
        summary
    }

    /// Run the worker pool (plus a maintenance task) in the background.
    pub fn spawn(self: &Arc<Self>) -> QueueHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(self.settings.concurrency + 1);

        for worker in 0..self.settings.concurrency {
            tasks.push(tokio::spawn(worker_loop(
                Arc::clone(self),
                worker,
                shutdown_rx.clone(),
            )));
        }
        tasks.push(tokio::spawn(maintenance_loop(Arc::clone(self), shutdown_rx)));

        info!(workers = self.settings.concurrency, "job queue started");
        QueueHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }

    /// Stop claiming new jobs. Running jobs finish (or time out) normally.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("job queue paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.wakeup.notify_waiters();
        info!("job queue resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> Result<JobStats, QueueError> {
        Ok(self.store.stats()?)
    }

    pub fn status(&self) -> Result<QueueStatus, QueueError> {
        let stats = self.store.stats()?;
        let state = self.lock_state()?;

        let (average_processing_ms, success_rate) = if state.executions == 0 {
            (None, None)
        } else {
            let n = state.executions as f64;
            (
                Some(state.total_duration_ms as f64 / n),
                Some(state.succeeded as f64 / n),
            )
        };

        Ok(QueueStatus {
            depth: stats.pending + stats.failed,
            pending: stats.pending,
            processing: stats.processing,
            failed: stats.failed,
            completed: stats.completed,
            dead_letter: stats.dead_letter,
            executions: state.executions,
            average_processing_ms,
            success_rate,
            paused: self.is_paused(),
            concurrency: self.settings.concurrency,
        })
    }

    /// Most recent executions first, optionally for one league.
    pub fn history(
        &self,
        league_id: Option<LeagueId>,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, QueueError> {
        let state = self.lock_state()?;
        Ok(state
            .history
            .iter()
            .rev()
            .filter(|r| league_id.is_none_or(|l| r.key.league_id == l))
            .take(limit)
            .cloned()
            .collect())
    }

    pub fn job(&self, job_id: JobId) -> Result<Option<CalculationJob>, QueueError> {
        Ok(self.store.get(job_id)?)
    }

    pub fn jobs(&self, filter: &JobFilter, limit: usize) -> Result<Vec<CalculationJob>, QueueError> {
        Ok(self.store.list(filter, limit)?)
    }

    pub fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, QueueError> {
        Ok(self.store.list_dead_letters(limit)?)
    }

    /// Move a dead-lettered job back into the queue with a fresh retry budget.
    pub fn resubmit_dead_letter(&self, job_id: JobId) -> Result<SubmitReceipt, QueueError> {
        let mut state = self.lock_state()?;
        let entry = self.store.take_dead_letter(job_id)?;

        self.audit.record(
            AuditEntry::new(self.clock.now(), AuditAction::JobResubmitted, entry.job.key).job(job_id),
        );
        info!(job_id = %job_id, key = %entry.job.key, "dead-lettered job resubmitted");

        let receipt = self.submit_locked(
            &mut state,
            entry.job.key,
            entry.job.priority,
            JobTrigger::Resubmitted { original: job_id },
        )?;
        drop(state);

        self.wakeup.notify_waiters();
        Ok(receipt)
    }

    /// Drop a dead-lettered job for good.
    pub fn discard_dead_letter(&self, job_id: JobId) -> Result<DeadLetterEntry, QueueError> {
        let entry = self.store.take_dead_letter(job_id)?;
        self.audit.record(
            AuditEntry::new(self.clock.now(), AuditAction::JobDiscarded, entry.job.key).job(job_id),
        );
        info!(job_id = %job_id, key = %entry.job.key, "dead-lettered job discarded");
        Ok(entry)
    }

    /// Remove completed jobs older than the retention window.
    pub fn prune_finished(&self) -> Result<usize, QueueError> {
        let _state = self.lock_state()?;
        let before = self.clock.now() - self.settings.finished_job_retention;
        let pruned = self.store.prune_finished(before)?;
        if pruned > 0 {
            debug!(pruned, "finished jobs pruned");
        }
        Ok(pruned)
    }

    /// No pending, processing or failed-awaiting-retry jobs.
    pub fn is_idle(&self) -> Result<bool, QueueError> {
        Ok(self.store.stats()?.active() == 0)
    }

    /// Resolve once the queue is idle. Needs something draining the queue
    /// (background workers or a concurrent `process_queue`).
    pub async fn wait_idle(&self) -> Result<(), QueueError> {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle()? {
                return Ok(());
            }
            notified.await;
        }
    }
}

/// Handle to the background workers.
#[derive(Debug)]
pub struct QueueHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl QueueHandle {
    /// Signal shutdown and wait for every worker to stop. In-flight jobs run
    /// to completion first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                error!(error = %err, "queue task panicked");
            }
        }
        info!("job queue stopped");
    }
}

async fn worker_loop(manager: Arc<QueueManager>, worker: usize, mut shutdown: watch::Receiver<bool>) {
    debug!(worker, "queue worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        // Register interest before checking so a submit between the claim and
        // the wait is not missed.
        let notified = manager.wakeup.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let claimed = if manager.is_paused() {
            None
        } else {
            match manager.claim() {
                Ok(job) => job,
                Err(err) => {
                    error!(worker, error = %err, "failed to claim job");
                    None
                }
            }
        };

        match claimed {
            Some(job) => {
                manager.execute(job).await;
            }
            None => {
                tokio::select! {
                    _ = &mut notified => {}
                    _ = tokio::time::sleep(manager.settings.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    debug!(worker, "queue worker stopped");
}

async fn maintenance_loop(manager: Arc<QueueManager>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(manager.settings.maintenance_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = manager.prune_finished() {
                    warn!(error = %err, "failed to prune finished jobs");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    use matchday_core::{ManualClock, SeasonId, SystemClock};

    use crate::audit::InMemoryAuditLog;
    use crate::error::StoreError;
    use crate::jobs::store::InMemoryJobStore;

    /// Succeeds, fails or stalls according to a script; tracks concurrency.
    #[derive(Default)]
    struct ScriptedRunner {
        panics_left: AtomicUsize,
        failures_left: AtomicUsize,
        permanent: bool,
        delay: Option<Duration>,
        running: Mutex<HashSet<LeagueSeasonKey>>,
        overlap: AtomicBool,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        runs: AtomicUsize,
    }

    impl ScriptedRunner {
        fn failing(times: usize) -> Self {
            Self {
                failures_left: AtomicUsize::new(times),
                ..Self::default()
            }
        }

        fn panicking(times: usize) -> Self {
            Self {
                panics_left: AtomicUsize::new(times),
                ..Self::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl JobRunner for ScriptedRunner {
        async fn run(&self, job: &CalculationJob) -> Result<RunReport, JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self
                .panics_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                panic!("table exploded");
            }
            if !self.running.lock().unwrap().insert(job.key) {
                self.overlap.store(true, Ordering::SeqCst);
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.running.lock().unwrap().remove(&job.key);

            let fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                if self.permanent {
                    return Err(JobError::Calculation(
                        matchday_standings::CalculationError::MissingScore {
                            match_id: matchday_core::MatchId::new(),
                        },
                    ));
                }
                return Err(JobError::Store(StoreError::Unavailable("match store down".into())));
            }
            Ok(RunReport {
                snapshot_id: None,
                rows: 0,
            })
        }
    }

    struct Harness {
        manager: Arc<QueueManager>,
        runner: Arc<ScriptedRunner>,
        audit: Arc<InMemoryAuditLog>,
    }

    fn harness(runner: ScriptedRunner, settings: QueueSettings) -> Harness {
        let runner = Arc::new(runner);
        let audit = Arc::new(InMemoryAuditLog::new());
        let manager = Arc::new(QueueManager::new(
            InMemoryJobStore::arc(),
            runner.clone(),
            audit.clone(),
            Arc::new(SystemClock),
            settings,
        ));
        Harness {
            manager,
            runner,
            audit,
        }
    }

    fn settings(concurrency: usize, max_retries: u32) -> QueueSettings {
        QueueSettings {
            concurrency,
            retry: RetryPolicy::immediate(max_retries),
            job_timeout: Duration::from_secs(5),
            history_limit: 100,
            poll_interval: Duration::from_millis(10),
            ..QueueSettings::default()
        }
    }

    fn key() -> LeagueSeasonKey {
        LeagueSeasonKey::new(LeagueId::new(), SeasonId::new())
    }

    fn manual() -> JobTrigger {
        JobTrigger::Manual { description: None }
    }

    #[tokio::test]
    async fn duplicate_submissions_leave_one_active_job() {
        let h = harness(ScriptedRunner::default(), settings(1, 3));
        let k = key();

        let first = h.manager.submit(k, Priority::Normal, manual()).unwrap();
        let second = h.manager.submit(k, Priority::Normal, manual()).unwrap();

        assert_eq!(first.disposition, SubmitDisposition::Created);
        assert_eq!(second.disposition, SubmitDisposition::Merged);
        assert_eq!(first.job_id, second.job_id);
        assert_eq!(h.manager.stats().unwrap().active(), 1);
    }

    #[tokio::test]
    async fn higher_priority_escalates_in_place() {
        let h = harness(ScriptedRunner::default(), settings(1, 3));
        let k = key();

        let created = h.manager.submit(k, Priority::Low, manual()).unwrap();
        let escalated = h.manager.submit(k, Priority::High, manual()).unwrap();
        let merged = h.manager.submit(k, Priority::Normal, manual()).unwrap();

        assert_eq!(escalated.disposition, SubmitDisposition::Escalated);
        assert_eq!(merged.disposition, SubmitDisposition::Merged);
        assert_eq!(merged.priority, Priority::High);

        let job = h.manager.job(created.job_id).unwrap().unwrap();
        assert_eq!(job.priority, Priority::High);
        assert_eq!(job.sequence, 1);
        assert_eq!(h.audit.count(AuditAction::JobEscalated), 1);
    }

    #[tokio::test]
    async fn process_queue_runs_high_priority_first() {
        let h = harness(ScriptedRunner::default(), settings(1, 3));
        let low = key();
        let high = key();

        h.manager.submit(low, Priority::Low, manual()).unwrap();
        h.manager.submit(high, Priority::High, manual()).unwrap();

        let summary = h.manager.process_queue().await;
        assert_eq!(summary.succeeded, 2);

        let history = h.manager.history(None, 10).unwrap();
        // newest first
        assert_eq!(history[0].key, low);
        assert_eq!(history[1].key, high);
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let h = harness(ScriptedRunner::failing(2), settings(1, 3));
        let receipt = h.manager.submit(key(), Priority::Normal, manual()).unwrap();

        let summary = h.manager.process_queue().await;
        assert_eq!(summary.retried, 2);
        assert_eq!(summary.succeeded, 1);

        let job = h.manager.job(receipt.job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.retry_count, 2);
    }

    #[tokio::test]
    async fn exhausted_job_dead_letters_exactly_once() {
        let h = harness(ScriptedRunner::failing(usize::MAX), settings(2, 3));
        let receipt = h.manager.submit(key(), Priority::Normal, manual()).unwrap();

        let summary = h.manager.process_queue().await;
        assert_eq!(summary.executed, 3);
        assert_eq!(summary.dead_lettered, 1);

        let stats = h.manager.stats().unwrap();
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.dead_letter, 1);

        let dead = h.manager.dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job.id, receipt.job_id);
        assert_eq!(dead[0].job.retry_count, 3);
        assert!(dead[0].reason.contains("match store down"));
        assert_eq!(h.audit.count(AuditAction::JobDeadLettered), 1);
    }

    #[tokio::test]
    async fn permanent_failure_skips_retries() {
        let mut runner = ScriptedRunner::failing(1);
        runner.permanent = true;
        let h = harness(runner, settings(1, 3));
        h.manager.submit(key(), Priority::Normal, manual()).unwrap();

        let summary = h.manager.process_queue().await;
        assert_eq!(summary.executed, 1);
        assert_eq!(summary.dead_lettered, 1);
    }

    #[tokio::test]
    async fn resubmitted_dead_letter_runs_with_fresh_budget() {
        let h = harness(ScriptedRunner::failing(1), settings(1, 1));
        let k = key();
        let receipt = h.manager.submit(k, Priority::High, manual()).unwrap();
        h.manager.process_queue().await;
        assert_eq!(h.manager.dead_letters(10).unwrap().len(), 1);

        let resubmitted = h.manager.resubmit_dead_letter(receipt.job_id).unwrap();
        assert_eq!(resubmitted.disposition, SubmitDisposition::Created);
        assert_eq!(resubmitted.priority, Priority::High);
        assert!(h.manager.dead_letters(10).unwrap().is_empty());

        let summary = h.manager.process_queue().await;
        assert_eq!(summary.succeeded, 1);

        let job = h.manager.job(resubmitted.job_id).unwrap().unwrap();
        assert_eq!(job.trigger, JobTrigger::Resubmitted { original: receipt.job_id });
        assert_eq!(h.audit.count(AuditAction::JobResubmitted), 1);
    }

    #[tokio::test]
    async fn discarded_dead_letter_is_gone() {
        let h = harness(ScriptedRunner::failing(1), settings(1, 1));
        let receipt = h.manager.submit(key(), Priority::Normal, manual()).unwrap();
        h.manager.process_queue().await;

        h.manager.discard_dead_letter(receipt.job_id).unwrap();
        assert!(h.manager.dead_letters(10).unwrap().is_empty());
        assert!(matches!(
            h.manager.discard_dead_letter(receipt.job_id),
            Err(QueueError::Store(JobStoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn slow_job_times_out_and_follows_retry_policy() {
        let mut s = settings(1, 2);
        s.job_timeout = Duration::from_millis(20);
        let h = harness(ScriptedRunner::slow(Duration::from_millis(200)), s);
        h.manager.submit(key(), Priority::Normal, manual()).unwrap();

        let summary = h.manager.process_queue().await;
        assert_eq!(summary.retried, 1);
        assert_eq!(summary.dead_lettered, 1);

        let dead = h.manager.dead_letters(1).unwrap();
        assert!(dead[0].reason.contains("time budget"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn submission_during_run_schedules_one_follow_up() {
        let h = harness(ScriptedRunner::slow(Duration::from_millis(100)), settings(2, 3));
        let k = key();
        let first = h.manager.submit(k, Priority::Normal, manual()).unwrap();

        let manager = h.manager.clone();
        let drain = tokio::spawn(async move { manager.process_queue().await });

        // Wait until the job is running.
        while h.manager.stats().unwrap().processing == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let a = h.manager.submit(k, Priority::Normal, manual()).unwrap();
        let b = h.manager.submit(k, Priority::High, manual()).unwrap();
        assert_eq!(a.disposition, SubmitDisposition::FollowUpScheduled);
        assert_eq!(b.disposition, SubmitDisposition::FollowUpScheduled);
        assert_eq!(b.job_id, first.job_id);
        assert_eq!(h.manager.stats().unwrap().active(), 1);

        let summary = drain.await.unwrap();
        assert_eq!(summary.succeeded, 2);
        assert!(!h.runner.overlap.load(Ordering::SeqCst));

        let history = h.manager.history(None, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn paused_queue_accepts_but_does_not_run() {
        let h = harness(ScriptedRunner::default(), settings(2, 3));
        h.manager.pause();
        h.manager.submit(key(), Priority::Normal, manual()).unwrap();

        assert_eq!(h.manager.process_queue().await, ProcessSummary::default());
        let status = h.manager.status().unwrap();
        assert!(status.paused);
        assert_eq!(status.depth, 1);

        h.manager.resume();
        assert_eq!(h.manager.process_queue().await.succeeded, 1);
    }

    #[tokio::test]
    async fn status_reports_rates_and_history_is_bounded() {
        let mut s = settings(1, 1);
        s.history_limit = 2;
        let h = harness(ScriptedRunner::failing(1), s);

        assert_eq!(h.manager.status().unwrap().success_rate, None);

        for _ in 0..3 {
            h.manager.submit(key(), Priority::Normal, manual()).unwrap();
        }
        h.manager.process_queue().await;

        let status = h.manager.status().unwrap();
        assert_eq!(status.executions, 3);
        assert_eq!(status.dead_letter, 1);
        assert_eq!(status.completed, 2);
        let rate = status.success_rate.unwrap();
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(h.manager.history(None, 10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn history_filters_by_league() {
        let h = harness(ScriptedRunner::default(), settings(1, 1));
        let mine = key();
        h.manager.submit(mine, Priority::Normal, manual()).unwrap();
        h.manager.submit(key(), Priority::Normal, manual()).unwrap();
        h.manager.process_queue().await;

        let history = h.manager.history(Some(mine.league_id), 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].key, mine);
    }

    #[tokio::test]
    async fn finished_jobs_are_pruned_after_retention() {
        let clock = ManualClock::default();
        let runner = Arc::new(ScriptedRunner::default());
        let manager = Arc::new(QueueManager::new(
            InMemoryJobStore::arc(),
            runner,
            Arc::new(InMemoryAuditLog::new()),
            Arc::new(clock.clone()),
            settings(1, 1),
        ));

        manager.submit(key(), Priority::Normal, manual()).unwrap();
        manager.process_queue().await;
        assert_eq!(manager.prune_finished().unwrap(), 0);

        clock.advance(chrono::Duration::hours(25));
        assert_eq!(manager.prune_finished().unwrap(), 1);
        assert_eq!(manager.stats().unwrap().completed, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn background_workers_respect_pool_size() {
        let h = harness(ScriptedRunner::slow(Duration::from_millis(5)), settings(3, 1));
        let handle = h.manager.spawn();

        for _ in 0..30 {
            h.manager.submit(key(), Priority::Normal, manual()).unwrap();
        }
        tokio::time::timeout(Duration::from_secs(10), h.manager.wait_idle())
            .await
            .expect("queue drained")
            .unwrap();
        handle.shutdown().await;

        assert_eq!(h.runner.runs.load(Ordering::SeqCst), 30);
        assert!(h.runner.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(h.manager.stats().unwrap().completed, 30);
    }

    #[tokio::test]
    async fn runner_panic_dead_letters_and_frees_the_key() {
        let h = harness(ScriptedRunner::panicking(1), settings(1, 3));
        let k = key();
        let first = h.manager.submit(k, Priority::Normal, manual()).unwrap();

        let summary = h.manager.process_queue().await;
        assert_eq!(summary.executed, 1);
        assert_eq!(summary.dead_lettered, 1);

        let stats = h.manager.stats().unwrap();
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.dead_letter, 1);
        let dead = h.manager.dead_letters(10).unwrap();
        assert_eq!(dead[0].job.id, first.job_id);
        assert!(dead[0].reason.contains("table exploded"));

        let next = h.manager.submit(k, Priority::Normal, manual()).unwrap();
        assert_eq!(next.disposition, SubmitDisposition::Created);
        assert_ne!(next.job_id, first.job_id);
        assert_eq!(h.manager.process_queue().await.succeeded, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn background_worker_survives_a_runner_panic() {
        let h = harness(ScriptedRunner::panicking(1), settings(1, 3));
        let handle = h.manager.spawn();

        for _ in 0..5 {
            h.manager.submit(key(), Priority::Normal, manual()).unwrap();
        }
        tokio::time::timeout(Duration::from_secs(10), h.manager.wait_idle())
            .await
            .expect("queue drained")
            .unwrap();
        handle.shutdown().await;

        let stats = h.manager.stats().unwrap();
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.dead_letter, 1);
        assert_eq!(stats.completed, 4);
    }
}
