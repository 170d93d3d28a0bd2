//! Operator actions. Thin: every decision lives in the queue manager or the
//! snapshot store.

use std::sync::Arc;

use tracing::info;

use matchday_core::{JobId, LeagueSeasonKey, SnapshotId};
use matchday_infra::jobs::{
    CalculationJob, DeadLetterEntry, ExecutionRecord, JobFilter, JobTrigger, Priority,
    ProcessSummary, QueueManager, QueueStatus, SubmitReceipt,
};
use matchday_infra::matches::MatchSource;
use matchday_infra::snapshots::{RestoreReport, SnapshotDiff, SnapshotStore, SnapshotSummary};
use matchday_standings::TableRow;

use crate::dto::{
    CreateSnapshotRequest, HistoryQuery, TriggerAllRequest, TriggerRequest, TriggerResponse,
    normalize_description,
};
use crate::errors::OpsError;

#[derive(Clone)]
pub struct OperationsFacade {
    queue: Arc<QueueManager>,
    snapshots: Arc<SnapshotStore>,
    matches: Arc<dyn MatchSource>,
}

impl OperationsFacade {
    pub fn new(
        queue: Arc<QueueManager>,
        snapshots: Arc<SnapshotStore>,
        matches: Arc<dyn MatchSource>,
    ) -> Self {
        Self {
            queue,
            snapshots,
            matches,
        }
    }

    /// Queue a high-priority recalculation of one table.
    pub fn trigger(&self, req: &TriggerRequest) -> Result<SubmitReceipt, OpsError> {
        let key = req.table.key()?;
        let description = normalize_description(req.description.as_deref())?;
        info!(key = %key, description = ?description, "manual recalculation requested");
        Ok(self.submit_manual(key, description)?)
    }

    /// Queue every known table at high priority; the worker pool runs them
    /// in parallel.
    pub async fn trigger_all(&self, req: &TriggerAllRequest) -> Result<TriggerResponse, OpsError> {
        let description = normalize_description(req.description.as_deref())?;
        let keys = self.matches.known_keys().await?;
        info!(tables = keys.len(), "manual recalculation of all tables requested");

        let receipts = keys
            .into_iter()
            .map(|key| self.submit_manual(key, description.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TriggerResponse { receipts })
    }

    fn submit_manual(
        &self,
        key: LeagueSeasonKey,
        description: Option<String>,
    ) -> Result<SubmitReceipt, matchday_infra::jobs::QueueError> {
        self.queue
            .submit(key, Priority::High, JobTrigger::Manual { description })
    }

    /// Drain every ready job now (one-shot mode, without background workers).
    pub async fn run_pending(&self) -> ProcessSummary {
        self.queue.process_queue().await
    }

    pub fn status(&self) -> Result<QueueStatus, OpsError> {
        Ok(self.queue.status()?)
    }

    pub fn history(&self, query: &HistoryQuery) -> Result<Vec<ExecutionRecord>, OpsError> {
        Ok(self.queue.history(query.league()?, query.limit())?)
    }

    pub fn job(&self, job_id: JobId) -> Result<Option<CalculationJob>, OpsError> {
        Ok(self.queue.job(job_id)?)
    }

    pub fn jobs(&self, filter: &JobFilter, limit: usize) -> Result<Vec<CalculationJob>, OpsError> {
        Ok(self.queue.jobs(filter, limit)?)
    }

    pub fn pause(&self) {
        self.queue.pause();
    }

    pub fn resume(&self) {
        self.queue.resume();
    }

    // -------------------------
    // Snapshots
    // -------------------------

    pub async fn create_snapshot(&self, req: &CreateSnapshotRequest) -> Result<SnapshotId, OpsError> {
        let key = req.table.key()?;
        let description = normalize_description(req.description.as_deref())?
            .unwrap_or_else(|| "manual snapshot".to_string());
        Ok(self.snapshots.create_snapshot(key, description).await?)
    }

    pub async fn list_snapshots(&self, key: LeagueSeasonKey) -> Result<Vec<SnapshotSummary>, OpsError> {
        Ok(self.snapshots.list_snapshots(key).await?)
    }

    pub async fn restore_snapshot(&self, id: SnapshotId) -> Result<RestoreReport, OpsError> {
        info!(snapshot_id = %id, "snapshot restore requested");
        Ok(self.snapshots.restore_snapshot(id).await?)
    }

    pub async fn diff_snapshot(&self, id: SnapshotId) -> Result<SnapshotDiff, OpsError> {
        Ok(self.snapshots.diff_snapshot(id).await?)
    }

    /// The live table for `key`, in position order.
    pub async fn table(&self, key: LeagueSeasonKey) -> Result<Vec<TableRow>, OpsError> {
        Ok(self.snapshots.standings().load(key).await?)
    }

    // -------------------------
    // Dead letters
    // -------------------------

    pub fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, OpsError> {
        Ok(self.queue.dead_letters(limit)?)
    }

    pub fn resubmit_dead_letter(&self, job_id: JobId) -> Result<SubmitReceipt, OpsError> {
        Ok(self.queue.resubmit_dead_letter(job_id)?)
    }

    pub fn discard_dead_letter(&self, job_id: JobId) -> Result<DeadLetterEntry, OpsError> {
        Ok(self.queue.discard_dead_letter(job_id)?)
    }
}
