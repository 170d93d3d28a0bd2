//! What a recalculation job actually does.

use std::sync::Arc;

use tracing::debug;

use matchday_core::SnapshotId;
use matchday_standings::calculate;

use super::types::{CalculationJob, JobError};
use crate::matches::MatchSource;
use crate::read_model::StandingsRepository;
use crate::snapshots::SnapshotStore;

/// Summary of one successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Pre-calculation snapshot, if the runner took one.
    pub snapshot_id: Option<SnapshotId>,
    pub rows: usize,
}

/// Executes one claimed job. The queue manager owns retries and timeouts.
#[async_trait::async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &CalculationJob) -> Result<RunReport, JobError>;
}

/// Snapshot, load, calculate, replace; all under the key lock.
pub struct RecalculationRunner {
    matches: Arc<dyn MatchSource>,
    standings: Arc<dyn StandingsRepository>,
    snapshots: Arc<SnapshotStore>,
}

impl RecalculationRunner {
    /// Writes go to the snapshot store's standings repository and lock
    /// registry, so restores and recalculations exclude each other.
    pub fn new(matches: Arc<dyn MatchSource>, snapshots: Arc<SnapshotStore>) -> Self {
        Self {
            matches,
            standings: snapshots.standings().clone(),
            snapshots,
        }
    }
}

#[async_trait::async_trait]
impl JobRunner for RecalculationRunner {
    async fn run(&self, job: &CalculationJob) -> Result<RunReport, JobError> {
        let key = job.key;
        let _guard = self.snapshots.locks().acquire(key).await;

        let snapshot_id = self
            .snapshots
            .create_snapshot(key, format!("before recalculation (job {})", job.id))
            .await?;

        let matches = self.matches.matches_for(key).await?;
        let rows = calculate(key, &matches)?;

        debug!(
            job_id = %job.id,
            key = %key,
            matches = matches.len(),
            rows = rows.len(),
            "table calculated"
        );

        self.standings.replace(key, &rows).await?;

        Ok(RunReport {
            snapshot_id: Some(snapshot_id),
            rows: rows.len(),
        })
    }
}
