//! Strongly-typed identifiers used across the engine.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a league (competition).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeagueId(Uuid);

/// Identifier of a season.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeasonId(Uuid);

/// Identifier of a team (club side).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(Uuid);

/// Identifier of a match (fixture) record in the external store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(Uuid);

/// Identifier of a recalculation job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

/// Identifier of a table snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(LeagueId, "LeagueId");
impl_uuid_newtype!(SeasonId, "SeasonId");
impl_uuid_newtype!(TeamId, "TeamId");
impl_uuid_newtype!(MatchId, "MatchId");
impl_uuid_newtype!(JobId, "JobId");
impl_uuid_newtype!(SnapshotId, "SnapshotId");

/// The pair identifying one independent table instance.
///
/// All locking, job deduplication and snapshot scoping happen per key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LeagueSeasonKey {
    pub league_id: LeagueId,
    pub season_id: SeasonId,
}

impl LeagueSeasonKey {
    pub fn new(league_id: LeagueId, season_id: SeasonId) -> Self {
        Self {
            league_id,
            season_id,
        }
    }
}

impl core::fmt::Display for LeagueSeasonKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.league_id, self.season_id)
    }
}

/// Parses the `Display` form, `LEAGUE_ID/SEASON_ID`.
impl FromStr for LeagueSeasonKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (league, season) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| DomainError::invalid_key(s, "expected LEAGUE_ID/SEASON_ID"))?;

        let league_id = league
            .parse()
            .map_err(|e: DomainError| DomainError::invalid_key(s, e.to_string()))?;
        let season_id = season
            .parse()
            .map_err(|e: DomainError| DomainError::invalid_key(s, e.to_string()))?;
        Ok(Self::new(league_id, season_id))
    }
}
