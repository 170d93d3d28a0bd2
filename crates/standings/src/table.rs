use serde::{Deserialize, Serialize};

use matchday_core::{LeagueId, LeagueSeasonKey, SeasonId, TeamId};

use crate::match_result::TeamRef;

pub const POINTS_FOR_WIN: u32 = 3;
pub const POINTS_FOR_DRAW: u32 = 1;

/// A row counter would exceed `u32::MAX`. The row is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterOverflow;

/// One team's line in a league table.
///
/// Rows carry no timestamps: recomputing over the same matches must produce
/// byte-identical rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRow {
    pub league_id: LeagueId,
    pub season_id: SeasonId,
    pub team_id: TeamId,
    pub team_name: String,
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_difference: i64,
    pub points: u32,
    /// 1-based rank after sorting (0 until ranked).
    pub position: u32,
    /// `true` when produced by automatic calculation, `false` for manual edits.
    pub auto_calculated: bool,
}

impl TableRow {
    /// Zero-filled row for a team that has not played a finished match yet.
    pub fn empty(key: LeagueSeasonKey, team: &TeamRef) -> Self {
        Self {
            league_id: key.league_id,
            season_id: key.season_id,
            team_id: team.id,
            team_name: team.name.clone(),
            played: 0,
            wins: 0,
            draws: 0,
            losses: 0,
            goals_for: 0,
            goals_against: 0,
            goal_difference: 0,
            points: 0,
            position: 0,
            auto_calculated: true,
        }
    }

    pub fn key(&self) -> LeagueSeasonKey {
        LeagueSeasonKey::new(self.league_id, self.season_id)
    }

    /// Add one finished game from this team's perspective.
    ///
    /// All counters are updated together or not at all.
    pub fn record(&mut self, scored: u32, conceded: u32) -> Result<(), CounterOverflow> {
        let (mut wins, mut draws, mut losses) = (self.wins, self.draws, self.losses);
        let outcome = match scored.cmp(&conceded) {
            core::cmp::Ordering::Greater => &mut wins,
            core::cmp::Ordering::Equal => &mut draws,
            core::cmp::Ordering::Less => &mut losses,
        };
        *outcome = outcome.checked_add(1).ok_or(CounterOverflow)?;

        let played = self.played.checked_add(1).ok_or(CounterOverflow)?;
        let goals_for = self.goals_for.checked_add(scored).ok_or(CounterOverflow)?;
        let goals_against = self.goals_against.checked_add(conceded).ok_or(CounterOverflow)?;
        let points = wins
            .checked_mul(POINTS_FOR_WIN)
            .and_then(|w| draws.checked_mul(POINTS_FOR_DRAW).and_then(|d| w.checked_add(d)))
            .ok_or(CounterOverflow)?;

        self.played = played;
        self.wins = wins;
        self.draws = draws;
        self.losses = losses;
        self.goals_for = goals_for;
        self.goals_against = goals_against;
        self.goal_difference = i64::from(goals_for) - i64::from(goals_against);
        self.points = points;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_derives_points_and_goal_difference() {
        let key = LeagueSeasonKey::new(LeagueId::new(), SeasonId::new());
        let mut row = TableRow::empty(key, &TeamRef::new(TeamId::new(), "Rovers"));

        row.record(3, 1).unwrap();
        row.record(0, 0).unwrap();
        row.record(1, 2).unwrap();

        assert_eq!(row.played, 3);
        assert_eq!((row.wins, row.draws, row.losses), (1, 1, 1));
        assert_eq!(row.goals_for, 4);
        assert_eq!(row.goals_against, 3);
        assert_eq!(row.goal_difference, 1);
        assert_eq!(row.points, 4);
    }

    #[test]
    fn overflowing_goals_leave_the_row_untouched() {
        let key = LeagueSeasonKey::new(LeagueId::new(), SeasonId::new());
        let mut row = TableRow::empty(key, &TeamRef::new(TeamId::new(), "Rovers"));

        row.record(u32::MAX - 1, 0).unwrap();
        let before = row.clone();

        assert_eq!(row.record(5, 0), Err(CounterOverflow));
        assert_eq!(row, before);
    }
}
