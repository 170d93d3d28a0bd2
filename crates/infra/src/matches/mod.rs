//! Read access to the external match store.

pub mod postgres;

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use matchday_core::{LeagueSeasonKey, MatchId};
use matchday_standings::MatchResult;

use crate::error::StoreError;

pub use postgres::PostgresMatchSource;

/// Consistent read access to match records owned by the host system.
#[async_trait::async_trait]
pub trait MatchSource: Send + Sync {
    /// Every match recorded for `key`, whatever its status.
    async fn matches_for(&self, key: LeagueSeasonKey) -> Result<Vec<MatchResult>, StoreError>;

    /// All league+season pairs that have at least one match.
    async fn known_keys(&self) -> Result<Vec<LeagueSeasonKey>, StoreError>;
}

/// In-memory match store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryMatchSource {
    matches: RwLock<HashMap<MatchId, MatchResult>>,
}

impl InMemoryMatchSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, m: MatchResult) -> Result<(), StoreError> {
        let mut matches = self.matches.write().map_err(|_| StoreError::Poisoned)?;
        matches.insert(m.match_id, m);
        Ok(())
    }

    pub fn remove(&self, match_id: MatchId) -> Result<Option<MatchResult>, StoreError> {
        let mut matches = self.matches.write().map_err(|_| StoreError::Poisoned)?;
        Ok(matches.remove(&match_id))
    }

    pub fn get(&self, match_id: MatchId) -> Result<Option<MatchResult>, StoreError> {
        let matches = self.matches.read().map_err(|_| StoreError::Poisoned)?;
        Ok(matches.get(&match_id).cloned())
    }
}

#[async_trait::async_trait]
impl MatchSource for InMemoryMatchSource {
    async fn matches_for(&self, key: LeagueSeasonKey) -> Result<Vec<MatchResult>, StoreError> {
        let matches = self.matches.read().map_err(|_| StoreError::Poisoned)?;
        Ok(matches
            .values()
            .filter(|m| m.key() == Some(key))
            .cloned()
            .collect())
    }

    async fn known_keys(&self) -> Result<Vec<LeagueSeasonKey>, StoreError> {
        let matches = self.matches.read().map_err(|_| StoreError::Poisoned)?;
        let keys: BTreeSet<_> = matches.values().filter_map(MatchResult::key).collect();
        Ok(keys.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchday_core::{LeagueId, SeasonId, TeamId};
    use matchday_standings::TeamRef;

    #[tokio::test]
    async fn filters_by_key_and_lists_known_keys() {
        let source = InMemoryMatchSource::new();
        let first = LeagueSeasonKey::new(LeagueId::new(), SeasonId::new());
        let second = LeagueSeasonKey::new(LeagueId::new(), SeasonId::new());
        let team = |name: &str| TeamRef::new(TeamId::new(), name);

        source
            .upsert(MatchResult::finished(first, team("A"), team("B"), 1, 0))
            .unwrap();
        source
            .upsert(MatchResult::planned(second, team("C"), team("D")))
            .unwrap();

        let mut orphan = MatchResult::planned(first, team("E"), team("F"));
        orphan.season_id = None;
        source.upsert(orphan).unwrap();

        assert_eq!(source.matches_for(first).await.unwrap().len(), 1);

        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(source.known_keys().await.unwrap(), expected);
    }
}
