//! Match lifecycle notifications published by the host content store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use matchday_core::{LeagueId, MatchId};
use matchday_standings::MatchResult;

/// Marks messages that belong to one league.
///
/// Lets a worker be pinned to a single league, e.g. when a deployment splits
/// competitions across processes.
pub trait LeagueScoped {
    fn league_id(&self) -> Option<LeagueId>;
}

/// A change to one match record in the external store.
///
/// `Saved` is the generic form (the store does not know what changed);
/// the other variants are used when the caller already knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchLifecycleEvent {
    Saved {
        current: MatchResult,
        previous: Option<MatchResult>,
        occurred_at: DateTime<Utc>,
    },
    Finished {
        current: MatchResult,
        occurred_at: DateTime<Utc>,
    },
    Corrected {
        current: MatchResult,
        previous: MatchResult,
        occurred_at: DateTime<Utc>,
    },
    Deleted {
        previous: MatchResult,
        occurred_at: DateTime<Utc>,
    },
}

impl MatchLifecycleEvent {
    pub fn saved(current: MatchResult, previous: Option<MatchResult>) -> Self {
        Self::Saved {
            current,
            previous,
            occurred_at: Utc::now(),
        }
    }

    pub fn finished(current: MatchResult) -> Self {
        Self::Finished {
            current,
            occurred_at: Utc::now(),
        }
    }

    pub fn corrected(current: MatchResult, previous: MatchResult) -> Self {
        Self::Corrected {
            current,
            previous,
            occurred_at: Utc::now(),
        }
    }

    pub fn deleted(previous: MatchResult) -> Self {
        Self::Deleted {
            previous,
            occurred_at: Utc::now(),
        }
    }

    pub fn match_id(&self) -> MatchId {
        match self {
            Self::Saved { current, .. }
            | Self::Finished { current, .. }
            | Self::Corrected { current, .. } => current.match_id,
            Self::Deleted { previous, .. } => previous.match_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::Saved { occurred_at, .. }
            | Self::Finished { occurred_at, .. }
            | Self::Corrected { occurred_at, .. }
            | Self::Deleted { occurred_at, .. } => *occurred_at,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Saved { .. } => "saved",
            Self::Finished { .. } => "finished",
            Self::Corrected { .. } => "corrected",
            Self::Deleted { .. } => "deleted",
        }
    }
}

impl LeagueScoped for MatchLifecycleEvent {
    /// The league of the current record, falling back to the previous one.
    fn league_id(&self) -> Option<LeagueId> {
        match self {
            Self::Saved {
                current, previous, ..
            } => current
                .league_id
                .or_else(|| previous.as_ref().and_then(|p| p.league_id)),
            Self::Finished { current, .. } => current.league_id,
            Self::Corrected {
                current, previous, ..
            } => current.league_id.or(previous.league_id),
            Self::Deleted { previous, .. } => previous.league_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchday_core::{LeagueSeasonKey, SeasonId, TeamId};
    use matchday_standings::TeamRef;

    fn sample() -> MatchResult {
        let key = LeagueSeasonKey::new(LeagueId::new(), SeasonId::new());
        MatchResult::finished(
            key,
            TeamRef::new(TeamId::new(), "Home"),
            TeamRef::new(TeamId::new(), "Away"),
            1,
            0,
        )
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = MatchLifecycleEvent::finished(sample());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "finished");

        let back: MatchLifecycleEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn league_falls_back_to_previous_record() {
        let previous = sample();
        let mut current = previous.clone();
        current.league_id = None;

        let event = MatchLifecycleEvent::saved(current, Some(previous.clone()));
        assert_eq!(event.league_id(), previous.league_id);
        assert_eq!(event.match_id(), previous.match_id);
    }
}
