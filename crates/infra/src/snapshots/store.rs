//! Snapshot service: capture, verify-and-restore, retention.

use std::sync::Arc;

use tracing::{info, warn};

use matchday_core::{Clock, LeagueSeasonKey, SnapshotId};

use super::repository::SnapshotRepository;
use super::types::{Snapshot, SnapshotDiff, SnapshotError, SnapshotRetention, SnapshotSummary};
use crate::audit::{AuditAction, AuditEntry, AuditSink};
use crate::locks::KeyLocks;
use crate::read_model::StandingsRepository;

/// Result of a successful rollback.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RestoreReport {
    pub snapshot_id: SnapshotId,
    pub key: LeagueSeasonKey,
    pub rows_restored: usize,
}

pub struct SnapshotStore {
    snapshots: Arc<dyn SnapshotRepository>,
    standings: Arc<dyn StandingsRepository>,
    locks: KeyLocks,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    retention: SnapshotRetention,
}

impl SnapshotStore {
    pub fn new(
        snapshots: Arc<dyn SnapshotRepository>,
        standings: Arc<dyn StandingsRepository>,
        locks: KeyLocks,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        retention: SnapshotRetention,
    ) -> Self {
        Self {
            snapshots,
            standings,
            locks,
            audit,
            clock,
            retention,
        }
    }

    /// The lock registry shared with table writers.
    pub fn locks(&self) -> &KeyLocks {
        &self.locks
    }

    pub fn standings(&self) -> &Arc<dyn StandingsRepository> {
        &self.standings
    }

    /// Capture the live table for `key`.
    ///
    /// Does not take the key lock: the live table is only ever replaced
    /// atomically, so the read is consistent. Callers that need the capture
    /// to precede their own write (job execution) hold the lock themselves.
    pub async fn create_snapshot(
        &self,
        key: LeagueSeasonKey,
        description: impl Into<String>,
    ) -> Result<SnapshotId, SnapshotError> {
        let rows = self.standings.load(key).await?;
        let snapshot = Snapshot::capture(key, rows, description, self.clock.now())?;
        self.snapshots.insert(&snapshot).await?;

        info!(
            snapshot_id = %snapshot.id,
            key = %key,
            rows = snapshot.rows.len(),
            "snapshot created"
        );
        self.audit.record(
            AuditEntry::new(snapshot.created_at, AuditAction::SnapshotCreated, key)
                .snapshot(snapshot.id)
                .detail(snapshot.description.clone()),
        );

        self.prune(key).await?;
        Ok(snapshot.id)
    }

    /// Verify `id` and atomically make it the live table.
    ///
    /// On any failure the live table is left exactly as it was.
    pub async fn restore_snapshot(&self, id: SnapshotId) -> Result<RestoreReport, SnapshotError> {
        let snapshot = self
            .snapshots
            .get(id)
            .await?
            .ok_or(SnapshotError::NotFound(id))?;

        if let Err(err) = snapshot.verify() {
            self.restore_failed(&snapshot, &err);
            return Err(err);
        }

        let _guard = self.locks.acquire(snapshot.key).await;
        if let Err(err) = self.standings.replace(snapshot.key, &snapshot.rows).await {
            let err = SnapshotError::from(err);
            self.restore_failed(&snapshot, &err);
            return Err(err);
        }

        info!(snapshot_id = %id, key = %snapshot.key, "snapshot restored");
        self.audit.record(
            AuditEntry::new(self.clock.now(), AuditAction::SnapshotRestored, snapshot.key)
                .snapshot(id),
        );

        Ok(RestoreReport {
            snapshot_id: id,
            key: snapshot.key,
            rows_restored: snapshot.rows.len(),
        })
    }

    /// Snapshots for `key`, newest first, after applying retention.
    pub async fn list_snapshots(&self, key: LeagueSeasonKey) -> Result<Vec<SnapshotSummary>, SnapshotError> {
        self.prune(key).await?;
        Ok(self.snapshots.list(key).await?)
    }

    pub async fn get_snapshot(&self, id: SnapshotId) -> Result<Snapshot, SnapshotError> {
        self.snapshots
            .get(id)
            .await?
            .ok_or(SnapshotError::NotFound(id))
    }

    /// Compare a snapshot with the live table.
    pub async fn diff_snapshot(&self, id: SnapshotId) -> Result<SnapshotDiff, SnapshotError> {
        let snapshot = self.get_snapshot(id).await?;
        let live = self.standings.load(snapshot.key).await?;
        Ok(SnapshotDiff::between(&snapshot, &live))
    }

    /// Delete snapshots of `key` beyond the count or age bound.
    pub async fn prune(&self, key: LeagueSeasonKey) -> Result<usize, SnapshotError> {
        let listed = self.snapshots.list(key).await?;
        let expired = self.retention.expired(&listed, self.clock.now());
        if expired.is_empty() {
            return Ok(0);
        }

        let deleted = self.snapshots.delete(&expired).await?;
        let now = self.clock.now();
        for id in &expired {
            self.audit
                .record(AuditEntry::new(now, AuditAction::SnapshotPruned, key).snapshot(*id));
        }
        info!(key = %key, deleted, "snapshots pruned");
        Ok(deleted)
    }

    fn restore_failed(&self, snapshot: &Snapshot, err: &SnapshotError) {
        warn!(
            snapshot_id = %snapshot.id,
            key = %snapshot.key,
            error = %err,
            "snapshot restore failed; live table unchanged"
        );
        self.audit.record(
            AuditEntry::new(self.clock.now(), AuditAction::SnapshotRestoreFailed, snapshot.key)
                .snapshot(snapshot.id)
                .detail(err.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditLog;
    use crate::read_model::InMemoryStandingsRepository;
    use crate::snapshots::InMemorySnapshotRepository;
    use matchday_core::{LeagueId, ManualClock, SeasonId, TeamId};
    use matchday_standings::{TableRow, TeamRef};

    struct Fixture {
        store: SnapshotStore,
        snapshots: Arc<InMemorySnapshotRepository>,
        standings: Arc<InMemoryStandingsRepository>,
        audit: Arc<InMemoryAuditLog>,
        clock: ManualClock,
        key: LeagueSeasonKey,
    }

    fn fixture(retention: SnapshotRetention) -> Fixture {
        let snapshots = Arc::new(InMemorySnapshotRepository::new());
        let standings = Arc::new(InMemoryStandingsRepository::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let clock = ManualClock::default();
        let store = SnapshotStore::new(
            snapshots.clone(),
            standings.clone(),
            KeyLocks::new(),
            audit.clone(),
            Arc::new(clock.clone()),
            retention,
        );
        Fixture {
            store,
            snapshots,
            standings,
            audit,
            clock,
            key: LeagueSeasonKey::new(LeagueId::new(), SeasonId::new()),
        }
    }

    fn table(key: LeagueSeasonKey, points: &[u32]) -> Vec<TableRow> {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let mut row = TableRow::empty(key, &TeamRef::new(TeamId::new(), format!("Team {i}")));
                row.points = *p;
                row.position = i as u32 + 1;
                row
            })
            .collect()
    }

    #[tokio::test]
    async fn restore_brings_back_captured_table() {
        let f = fixture(SnapshotRetention::default());
        let before = table(f.key, &[6, 3, 0]);
        f.standings.replace(f.key, &before).await.unwrap();

        let id = f.store.create_snapshot(f.key, "before").await.unwrap();
        f.standings.replace(f.key, &table(f.key, &[9])).await.unwrap();

        let report = f.store.restore_snapshot(id).await.unwrap();
        assert_eq!(report.rows_restored, 3);
        assert_eq!(f.standings.load(f.key).await.unwrap(), before);
        assert_eq!(f.audit.count(AuditAction::SnapshotRestored), 1);
    }

    #[tokio::test]
    async fn corrupted_snapshot_is_refused_and_table_untouched() {
        let f = fixture(SnapshotRetention::default());
        let live = table(f.key, &[3, 1]);
        f.standings.replace(f.key, &live).await.unwrap();

        let mut corrupted = Snapshot::capture(f.key, table(f.key, &[0]), "bad", f.clock.now()).unwrap();
        corrupted.rows[0].points = 99;
        f.snapshots.insert(&corrupted).await.unwrap();

        let err = f.store.restore_snapshot(corrupted.id).await.unwrap_err();
        assert!(matches!(err, SnapshotError::ChecksumMismatch { .. }));
        assert_eq!(f.standings.load(f.key).await.unwrap(), live);
        assert_eq!(f.audit.count(AuditAction::SnapshotRestoreFailed), 1);
    }

    #[tokio::test]
    async fn restore_of_unknown_snapshot_is_not_found() {
        let f = fixture(SnapshotRetention::default());
        let id = SnapshotId::new();
        assert_eq!(
            f.store.restore_snapshot(id).await.unwrap_err(),
            SnapshotError::NotFound(id)
        );
    }

    #[tokio::test]
    async fn restore_waits_for_key_lock() {
        let f = fixture(SnapshotRetention::default());
        f.standings.replace(f.key, &table(f.key, &[1])).await.unwrap();
        let id = f.store.create_snapshot(f.key, "s").await.unwrap();

        let guard = f.store.locks().acquire(f.key).await;
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            f.store.restore_snapshot(id),
        )
        .await;
        assert!(blocked.is_err());

        drop(guard);
        f.store.restore_snapshot(id).await.unwrap();
    }

    #[tokio::test]
    async fn list_is_newest_first_and_bounded_by_count() {
        let f = fixture(SnapshotRetention {
            max_count: 2,
            max_age: chrono::Duration::days(30),
        });

        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(f.store.create_snapshot(f.key, format!("s{i}")).await.unwrap());
            f.clock.advance(chrono::Duration::minutes(1));
        }

        let listed: Vec<SnapshotId> = f
            .store
            .list_snapshots(f.key)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(listed, vec![ids[2], ids[1]]);
        assert_eq!(f.audit.count(AuditAction::SnapshotPruned), 1);
    }

    #[tokio::test]
    async fn old_snapshots_age_out_on_list() {
        let f = fixture(SnapshotRetention {
            max_count: 10,
            max_age: chrono::Duration::days(30),
        });

        f.store.create_snapshot(f.key, "old").await.unwrap();
        f.clock.advance(chrono::Duration::days(31));

        assert!(f.store.list_snapshots(f.key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn diff_shows_changes_since_capture() {
        let f = fixture(SnapshotRetention::default());
        let rows = table(f.key, &[3, 0]);
        f.standings.replace(f.key, &rows).await.unwrap();
        let id = f.store.create_snapshot(f.key, "s").await.unwrap();

        let mut changed = rows.clone();
        changed[1].points = 1;
        f.standings.replace(f.key, &changed).await.unwrap();

        let diff = f.store.diff_snapshot(id).await.unwrap();
        assert_eq!(diff.unchanged, 1);
        assert_eq!(diff.changed.len(), 1);
        assert!(diff.added.is_empty() && diff.removed.is_empty());
    }
}
