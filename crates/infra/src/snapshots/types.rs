use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use matchday_core::{LeagueSeasonKey, SnapshotId, TeamId};
use matchday_standings::TableRow;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot not found: {0}")]
    NotFound(SnapshotId),

    #[error("snapshot {id} failed checksum verification (stored {stored}, computed {computed})")]
    ChecksumMismatch {
        id: SnapshotId,
        stored: String,
        computed: String,
    },

    #[error("failed to encode table rows: {0}")]
    Encode(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SnapshotError {
    /// Store outages may clear up; bad checksums and missing ids will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, SnapshotError::Store(_))
    }
}

/// SHA-256 (hex) over the canonical JSON encoding of `rows`.
pub fn checksum(rows: &[TableRow]) -> Result<String, SnapshotError> {
    let bytes = serde_json::to_vec(rows).map_err(|e| SnapshotError::Encode(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Immutable copy of one league+season table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub key: LeagueSeasonKey,
    pub rows: Vec<TableRow>,
    pub checksum: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn capture(
        key: LeagueSeasonKey,
        rows: Vec<TableRow>,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SnapshotError> {
        let checksum = checksum(&rows)?;
        Ok(Self {
            id: SnapshotId::new(),
            key,
            rows,
            checksum,
            description: description.into(),
            created_at,
        })
    }

    /// Recompute the checksum and compare it with the stored one.
    pub fn verify(&self) -> Result<(), SnapshotError> {
        let computed = checksum(&self.rows)?;
        if computed != self.checksum {
            return Err(SnapshotError::ChecksumMismatch {
                id: self.id,
                stored: self.checksum.clone(),
                computed,
            });
        }
        Ok(())
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            id: self.id,
            key: self.key,
            description: self.description.clone(),
            checksum: self.checksum.clone(),
            row_count: self.rows.len(),
            created_at: self.created_at,
        }
    }
}

/// Listing view of a snapshot (rows omitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub key: LeagueSeasonKey,
    pub description: String,
    pub checksum: String,
    pub row_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowChange {
    pub team_id: TeamId,
    pub snapshot: TableRow,
    pub live: TableRow,
}

/// Differences between a snapshot and the live table, from the snapshot's
/// point of view: `added` rows exist only live, `removed` only in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub snapshot_id: SnapshotId,
    pub key: LeagueSeasonKey,
    pub added: Vec<TableRow>,
    pub removed: Vec<TableRow>,
    pub changed: Vec<RowChange>,
    pub unchanged: usize,
}

impl SnapshotDiff {
    pub fn between(snapshot: &Snapshot, live: &[TableRow]) -> Self {
        let mut added = Vec::new();
        let mut changed = Vec::new();
        let mut unchanged = 0;

        for row in live {
            match snapshot.rows.iter().find(|r| r.team_id == row.team_id) {
                None => added.push(row.clone()),
                Some(old) if old == row => unchanged += 1,
                Some(old) => changed.push(RowChange {
                    team_id: row.team_id,
                    snapshot: old.clone(),
                    live: row.clone(),
                }),
            }
        }

        let removed = snapshot
            .rows
            .iter()
            .filter(|r| !live.iter().any(|l| l.team_id == r.team_id))
            .cloned()
            .collect();

        Self {
            snapshot_id: snapshot.id,
            key: snapshot.key,
            added,
            removed,
            changed,
            unchanged,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Count and age bounds applied to each key's snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRetention {
    pub max_count: usize,
    pub max_age: chrono::Duration,
}

impl Default for SnapshotRetention {
    fn default() -> Self {
        Self {
            max_count: 20,
            max_age: chrono::Duration::days(30),
        }
    }
}

impl SnapshotRetention {
    /// Ids to delete from `newest_first`: everything past `max_count` and
    /// everything created before `now - max_age`.
    pub fn expired(&self, newest_first: &[SnapshotSummary], now: DateTime<Utc>) -> Vec<SnapshotId> {
        let cutoff = now - self.max_age;
        newest_first
            .iter()
            .enumerate()
            .filter(|(idx, s)| *idx >= self.max_count || s.created_at < cutoff)
            .map(|(_, s)| s.id)
            .collect()
    }
}
