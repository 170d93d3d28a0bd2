//! Snapshot persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use matchday_core::{LeagueSeasonKey, SnapshotId};

use super::types::{Snapshot, SnapshotSummary};
use crate::error::StoreError;

/// Stores immutable snapshots. There is deliberately no update operation.
#[async_trait::async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn insert(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    async fn get(&self, id: SnapshotId) -> Result<Option<Snapshot>, StoreError>;

    /// Summaries for `key`, newest first.
    async fn list(&self, key: LeagueSeasonKey) -> Result<Vec<SnapshotSummary>, StoreError>;

    /// Returns the number of snapshots actually deleted.
    async fn delete(&self, ids: &[SnapshotId]) -> Result<usize, StoreError>;
}

/// In-memory snapshot repository for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySnapshotRepository {
    snapshots: RwLock<HashMap<SnapshotId, Snapshot>>,
}

impl InMemorySnapshotRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn insert(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.write().map_err(|_| StoreError::Poisoned)?;
        snapshots.insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    async fn get(&self, id: SnapshotId) -> Result<Option<Snapshot>, StoreError> {
        let snapshots = self.snapshots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(snapshots.get(&id).cloned())
    }

    async fn list(&self, key: LeagueSeasonKey) -> Result<Vec<SnapshotSummary>, StoreError> {
        let snapshots = self.snapshots.read().map_err(|_| StoreError::Poisoned)?;
        let mut result: Vec<_> = snapshots
            .values()
            .filter(|s| s.key == key)
            .map(Snapshot::summary)
            .collect();

        // UUIDv7 ids break ties between snapshots taken in the same instant.
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(result)
    }

    async fn delete(&self, ids: &[SnapshotId]) -> Result<usize, StoreError> {
        let mut snapshots = self.snapshots.write().map_err(|_| StoreError::Poisoned)?;
        Ok(ids.iter().filter(|id| snapshots.remove(*id).is_some()).count())
    }
}
