//! Live league tables (the automation engine's write target).

pub mod postgres;

use std::collections::HashMap;
use std::sync::RwLock;

use matchday_core::LeagueSeasonKey;
use matchday_standings::TableRow;

use crate::error::StoreError;

pub use postgres::PostgresStandingsRepository;

/// Table rows per league+season.
///
/// `replace` swaps the whole row set for a key in one step; readers observe
/// either the old table or the new one, never a mix.
#[async_trait::async_trait]
pub trait StandingsRepository: Send + Sync {
    /// Current rows for `key`, ordered by position.
    async fn load(&self, key: LeagueSeasonKey) -> Result<Vec<TableRow>, StoreError>;

    async fn replace(&self, key: LeagueSeasonKey, rows: &[TableRow]) -> Result<(), StoreError>;
}

/// In-memory standings store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryStandingsRepository {
    tables: RwLock<HashMap<LeagueSeasonKey, Vec<TableRow>>>,
}

impl InMemoryStandingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys that currently have a non-empty table.
    pub fn keys(&self) -> Vec<LeagueSeasonKey> {
        self.tables
            .read()
            .map(|t| t.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl StandingsRepository for InMemoryStandingsRepository {
    async fn load(&self, key: LeagueSeasonKey) -> Result<Vec<TableRow>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.get(&key).cloned().unwrap_or_default())
    }

    async fn replace(&self, key: LeagueSeasonKey, rows: &[TableRow]) -> Result<(), StoreError> {
        if let Some(foreign) = rows.iter().find(|r| r.key() != key) {
            return Err(StoreError::Corrupt(format!(
                "row for team {} belongs to {}, not {key}",
                foreign.team_id,
                foreign.key()
            )));
        }

        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;
        if rows.is_empty() {
            tables.remove(&key);
        } else {
            tables.insert(key, rows.to_vec());
        }
        Ok(())
    }
}
