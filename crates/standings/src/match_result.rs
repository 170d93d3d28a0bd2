use serde::{Deserialize, Serialize};

use matchday_core::{LeagueId, LeagueSeasonKey, MatchId, SeasonId, TeamId};

/// Match (fixture) status as maintained by the external store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Planned,
    Finished,
    Cancelled,
    Postponed,
}

/// Team reference carried on a match record (identity + display name).
///
/// The name is needed for the final alphabetical tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: TeamId,
    pub name: String,
}

impl TeamRef {
    pub fn new(id: TeamId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A match record as read from the external store.
///
/// Reference fields are optional because the record crosses a trust boundary:
/// a half-filled record must reach validation and be reported, not fail to
/// deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub match_id: MatchId,
    pub league_id: Option<LeagueId>,
    pub season_id: Option<SeasonId>,
    pub home_team: Option<TeamRef>,
    pub away_team: Option<TeamRef>,
    pub home_goals: Option<i32>,
    pub away_goals: Option<i32>,
    pub status: MatchStatus,
    pub matchday: Option<i32>,
}

impl MatchResult {
    /// A planned fixture between two teams, without scores.
    pub fn planned(key: LeagueSeasonKey, home: TeamRef, away: TeamRef) -> Self {
        Self {
            match_id: MatchId::new(),
            league_id: Some(key.league_id),
            season_id: Some(key.season_id),
            home_team: Some(home),
            away_team: Some(away),
            home_goals: None,
            away_goals: None,
            status: MatchStatus::Planned,
            matchday: None,
        }
    }

    /// A finished fixture with a final score.
    pub fn finished(
        key: LeagueSeasonKey,
        home: TeamRef,
        away: TeamRef,
        home_goals: i32,
        away_goals: i32,
    ) -> Self {
        Self {
            home_goals: Some(home_goals),
            away_goals: Some(away_goals),
            status: MatchStatus::Finished,
            ..Self::planned(key, home, away)
        }
    }

    pub fn with_matchday(mut self, matchday: i32) -> Self {
        self.matchday = Some(matchday);
        self
    }

    pub fn with_status(mut self, status: MatchStatus) -> Self {
        self.status = status;
        self
    }

    /// The league+season this match belongs to, when both references are set.
    pub fn key(&self) -> Option<LeagueSeasonKey> {
        match (self.league_id, self.season_id) {
            (Some(league_id), Some(season_id)) => Some(LeagueSeasonKey::new(league_id, season_id)),
            _ => None,
        }
    }

    /// Finished status with both scores present.
    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished && self.score().is_some()
    }

    pub fn score(&self) -> Option<(i32, i32)> {
        self.home_goals.zip(self.away_goals)
    }

    /// Whether two versions of the same record would rank teams differently.
    ///
    /// Compares everything the calculator reads: key, teams, scores and status.
    pub fn affects_table_differently(&self, other: &MatchResult) -> bool {
        self.key() != other.key()
            || self.status != other.status
            || self.score() != other.score()
            || self.home_team != other.home_team
            || self.away_team != other.away_team
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> LeagueSeasonKey {
        LeagueSeasonKey::new(LeagueId::new(), SeasonId::new())
    }

    #[test]
    fn finished_requires_both_scores() {
        let mut m = MatchResult::finished(
            key(),
            TeamRef::new(TeamId::new(), "A"),
            TeamRef::new(TeamId::new(), "B"),
            1,
            0,
        );
        assert!(m.is_finished());

        m.away_goals = None;
        assert!(!m.is_finished());
    }

    #[test]
    fn matchday_change_does_not_affect_table() {
        let m = MatchResult::finished(
            key(),
            TeamRef::new(TeamId::new(), "A"),
            TeamRef::new(TeamId::new(), "B"),
            2,
            2,
        );
        let moved = m.clone().with_matchday(7);
        assert!(!m.affects_table_differently(&moved));

        let mut corrected = m.clone();
        corrected.home_goals = Some(3);
        assert!(m.affects_table_differently(&corrected));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&MatchStatus::Postponed).unwrap();
        assert_eq!(json, "\"postponed\"");
    }
}
