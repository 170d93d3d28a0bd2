//! Append-only audit trail for job transitions and snapshot actions.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use matchday_core::{JobId, LeagueSeasonKey, SnapshotId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    JobSubmitted,
    JobEscalated,
    JobMerged,
    JobFollowUpScheduled,
    JobStarted,
    JobCompleted,
    JobFailed,
    JobDeadLettered,
    JobResubmitted,
    JobDiscarded,
    SnapshotCreated,
    SnapshotRestored,
    SnapshotRestoreFailed,
    SnapshotPruned,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JobSubmitted => "job_submitted",
            Self::JobEscalated => "job_escalated",
            Self::JobMerged => "job_merged",
            Self::JobFollowUpScheduled => "job_follow_up_scheduled",
            Self::JobStarted => "job_started",
            Self::JobCompleted => "job_completed",
            Self::JobFailed => "job_failed",
            Self::JobDeadLettered => "job_dead_lettered",
            Self::JobResubmitted => "job_resubmitted",
            Self::JobDiscarded => "job_discarded",
            Self::SnapshotCreated => "snapshot_created",
            Self::SnapshotRestored => "snapshot_restored",
            Self::SnapshotRestoreFailed => "snapshot_restore_failed",
            Self::SnapshotPruned => "snapshot_pruned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub action: AuditAction,
    pub key: Option<LeagueSeasonKey>,
    pub job_id: Option<JobId>,
    pub snapshot_id: Option<SnapshotId>,
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn new(at: DateTime<Utc>, action: AuditAction, key: LeagueSeasonKey) -> Self {
        Self {
            at,
            action,
            key: Some(key),
            job_id: None,
            snapshot_id: None,
            detail: None,
        }
    }

    pub fn job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn snapshot(mut self, snapshot_id: SnapshotId) -> Self {
        self.snapshot_id = Some(snapshot_id);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Outbound audit interface.
///
/// Recording must not fail the operation being audited, so the call is
/// infallible; sinks report their own delivery problems.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn record(&self, entry: AuditEntry) {
        (**self).record(entry)
    }
}

/// Emits each entry as a structured `tracing` event on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        info!(
            target: "audit",
            action = entry.action.as_str(),
            key = ?entry.key.map(|k| k.to_string()),
            job_id = ?entry.job_id.map(|j| j.to_string()),
            snapshot_id = ?entry.snapshot_id.map(|s| s.to_string()),
            detail = entry.detail.as_deref().unwrap_or(""),
            at = %entry.at,
            "audit"
        );
    }
}

/// In-memory audit log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .read()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.entries().into_iter().map(|e| e.action).collect()
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.entries().iter().filter(|e| e.action == action).count()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, entry: AuditEntry) {
        if let Ok(mut entries) = self.entries.write() {
            entries.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchday_core::{LeagueId, SeasonId};

    #[test]
    fn in_memory_log_keeps_insertion_order() {
        let log = InMemoryAuditLog::new();
        let key = LeagueSeasonKey::new(LeagueId::new(), SeasonId::new());
        let job = JobId::new();

        log.record(AuditEntry::new(Utc::now(), AuditAction::JobSubmitted, key).job(job));
        log.record(AuditEntry::new(Utc::now(), AuditAction::JobStarted, key).job(job));

        assert_eq!(log.actions(), vec![AuditAction::JobSubmitted, AuditAction::JobStarted]);
        assert_eq!(log.entries()[1].job_id, Some(job));
    }

    #[test]
    fn action_serializes_snake_case() {
        let json = serde_json::to_string(&AuditAction::SnapshotRestoreFailed).unwrap();
        assert_eq!(json, "\"snapshot_restore_failed\"");
        assert_eq!(AuditAction::SnapshotRestoreFailed.as_str(), "snapshot_restore_failed");
    }
}
