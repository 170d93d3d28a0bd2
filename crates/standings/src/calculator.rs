//! Standings calculation.
//!
//! Model:
//! - Accumulate per-team totals in one pass over the finished matches.
//! - Derive goal difference and points (win 3, draw 1, loss 0).
//! - Sort with the `STANDARD_RANKING` criteria and assign 1-based positions.
//!
//! The calculation is a pure function of the match set. Input order does not
//! matter and repeated runs produce identical rows, which is what makes job
//! retries and snapshot comparisons safe.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use thiserror::Error;

use matchday_core::{LeagueSeasonKey, MatchId, TeamId};

use crate::match_result::{MatchResult, MatchStatus, TeamRef};
use crate::table::{CounterOverflow, TableRow};

/// Unexpected data shape in the match set handed to the calculator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalculationError {
    #[error("match {match_id} does not belong to {expected}")]
    ForeignMatch {
        match_id: MatchId,
        expected: LeagueSeasonKey,
    },

    #[error("finished match {match_id} is missing a team reference")]
    MissingTeam { match_id: MatchId },

    #[error("finished match {match_id} is missing a score")]
    MissingScore { match_id: MatchId },

    #[error("finished match {match_id} has a negative score")]
    NegativeScore { match_id: MatchId },

    #[error("finished match {match_id} lists team {team_id} on both sides")]
    SameTeam { match_id: MatchId, team_id: TeamId },

    #[error("totals for team {team_id} overflow at match {match_id}")]
    CounterOverflow { match_id: MatchId, team_id: TeamId },
}

/// One ranking key. Numeric keys rank higher values first; names rank A→Z.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RankCriterion {
    Points,
    GoalDifference,
    GoalsFor,
    TeamName,
    /// Last resort for two different teams that share a display name.
    TeamId,
}

impl RankCriterion {
    pub fn compare(self, a: &TableRow, b: &TableRow) -> Ordering {
        match self {
            RankCriterion::Points => b.points.cmp(&a.points),
            RankCriterion::GoalDifference => b.goal_difference.cmp(&a.goal_difference),
            RankCriterion::GoalsFor => b.goals_for.cmp(&a.goals_for),
            RankCriterion::TeamName => a.team_name.cmp(&b.team_name),
            RankCriterion::TeamId => a.team_id.cmp(&b.team_id),
        }
    }
}

/// Tie-break order used for every league table.
///
/// No head-to-head criterion: only whole-season aggregates are compared.
pub const STANDARD_RANKING: [RankCriterion; 5] = [
    RankCriterion::Points,
    RankCriterion::GoalDifference,
    RankCriterion::GoalsFor,
    RankCriterion::TeamName,
    RankCriterion::TeamId,
];

/// Compare two rows with `STANDARD_RANKING`. `Less` means `a` ranks above `b`.
pub fn compare_rows(a: &TableRow, b: &TableRow) -> Ordering {
    STANDARD_RANKING
        .iter()
        .map(|criterion| criterion.compare(a, b))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Compute the full, ordered table for one league+season.
///
/// `matches` may contain fixtures in any status. Only finished ones count
/// towards totals, but every team that appears in any fixture gets a row.
pub fn calculate(
    key: LeagueSeasonKey,
    matches: &[MatchResult],
) -> Result<Vec<TableRow>, CalculationError> {
    // Deterministic visiting order; the latest record decides a team's display name.
    let mut ordered: Vec<&MatchResult> = matches.iter().collect();
    ordered.sort_by_key(|m| (m.matchday.unwrap_or(0), m.match_id));

    let mut rows: BTreeMap<TeamId, TableRow> = BTreeMap::new();

    for m in ordered {
        if m.key() != Some(key) {
            return Err(CalculationError::ForeignMatch {
                match_id: m.match_id,
                expected: key,
            });
        }

        for team in [&m.home_team, &m.away_team].into_iter().flatten() {
            register_team(&mut rows, key, team);
        }

        if m.status != MatchStatus::Finished {
            continue;
        }

        let (home, away) = match (&m.home_team, &m.away_team) {
            (Some(home), Some(away)) => (home, away),
            _ => return Err(CalculationError::MissingTeam { match_id: m.match_id }),
        };
        if home.id == away.id {
            return Err(CalculationError::SameTeam {
                match_id: m.match_id,
                team_id: home.id,
            });
        }

        let (home_goals, away_goals) = m
            .score()
            .ok_or(CalculationError::MissingScore { match_id: m.match_id })?;
        let home_goals = u32::try_from(home_goals)
            .map_err(|_| CalculationError::NegativeScore { match_id: m.match_id })?;
        let away_goals = u32::try_from(away_goals)
            .map_err(|_| CalculationError::NegativeScore { match_id: m.match_id })?;

        for (team_id, scored, conceded) in [
            (home.id, home_goals, away_goals),
            (away.id, away_goals, home_goals),
        ] {
            if let Some(row) = rows.get_mut(&team_id) {
                row.record(scored, conceded)
                    .map_err(|CounterOverflow| CalculationError::CounterOverflow {
                        match_id: m.match_id,
                        team_id,
                    })?;
            }
        }
    }

    let mut table: Vec<TableRow> = rows.into_values().collect();
    table.sort_by(compare_rows);
    for (idx, row) in table.iter_mut().enumerate() {
        row.position = idx as u32 + 1;
    }

    Ok(table)
}

fn register_team(rows: &mut BTreeMap<TeamId, TableRow>, key: LeagueSeasonKey, team: &TeamRef) {
    rows.entry(team.id)
        .and_modify(|row| row.team_name.clone_from(&team.name))
        .or_insert_with(|| TableRow::empty(key, team));
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchday_core::{LeagueId, SeasonId};
    use proptest::prelude::*;

    fn test_key() -> LeagueSeasonKey {
        LeagueSeasonKey::new(LeagueId::new(), SeasonId::new())
    }

    fn team(name: &str) -> TeamRef {
        TeamRef::new(TeamId::new(), name)
    }

    fn row_for<'a>(table: &'a [TableRow], team: &TeamRef) -> &'a TableRow {
        table
            .iter()
            .find(|r| r.team_id == team.id)
            .expect("team missing from table")
    }

    #[test]
    fn empty_match_set_yields_empty_table() {
        assert!(calculate(test_key(), &[]).unwrap().is_empty());
    }

    #[test]
    fn oversized_valid_scores_are_a_calculation_error() {
        let key = test_key();
        let giants = team("Giants");
        let minnows = team("Minnows");
        let matches = vec![
            MatchResult::finished(key, giants.clone(), minnows.clone(), i32::MAX, 0),
            MatchResult::finished(key, giants.clone(), minnows.clone(), i32::MAX, 0),
            MatchResult::finished(key, giants.clone(), minnows.clone(), 2, 0),
        ];
        assert!(matches.iter().all(|m| crate::validation::validate(m).valid));

        match calculate(key, &matches) {
            Err(CalculationError::CounterOverflow { team_id, .. }) => assert_eq!(team_id, giants.id),
            other => panic!("expected overflow error, got {other:?}"),
        }
    }

    #[test]
    fn home_win_three_one() {
        let key = test_key();
        let home = team("Harbour Town");
        let away = team("Valley United");
        let matches = vec![MatchResult::finished(key, home.clone(), away.clone(), 3, 1)];

        let table = calculate(key, &matches).unwrap();

        let h = row_for(&table, &home);
        assert_eq!((h.points, h.goals_for, h.goals_against, h.goal_difference), (3, 3, 1, 2));
        assert_eq!(h.position, 1);

        let a = row_for(&table, &away);
        assert_eq!((a.points, a.goals_for, a.goals_against, a.goal_difference), (0, 1, 3, -2));
        assert_eq!(a.position, 2);
        assert!(table.iter().all(|r| r.auto_calculated));
    }

    #[test]
    fn full_level_round_orders_alphabetically() {
        let key = test_key();
        let cobras = team("Cobras");
        let albatros = team("Albatros");
        let badgers = team("Badgers");
        let matches = vec![
            MatchResult::finished(key, cobras.clone(), albatros.clone(), 1, 1),
            MatchResult::finished(key, albatros.clone(), badgers.clone(), 1, 1),
            MatchResult::finished(key, badgers.clone(), cobras.clone(), 1, 1),
        ];

        let table = calculate(key, &matches).unwrap();

        let names: Vec<&str> = table.iter().map(|r| r.team_name.as_str()).collect();
        assert_eq!(names, vec!["Albatros", "Badgers", "Cobras"]);
        assert!(table.iter().all(|r| r.points == 2 && r.goal_difference == 0 && r.goals_for == 2));
        assert_eq!(table.iter().map(|r| r.position).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn goal_difference_beats_goals_for() {
        let key = test_key();
        let x = team("X");
        let y = team("Y");
        let z = team("Z");
        let w = team("W");
        let matches = vec![
            MatchResult::finished(key, x.clone(), y.clone(), 2, 0),
            MatchResult::finished(key, z.clone(), w.clone(), 4, 3),
        ];

        let table = calculate(key, &matches).unwrap();
        let names: Vec<&str> = table.iter().map(|r| r.team_name.as_str()).collect();
        assert_eq!(names, vec!["X", "Z", "W", "Y"]);
    }

    #[test]
    fn goals_for_breaks_equal_points_and_goal_difference() {
        let key = test_key();
        let a = team("A");
        let b = team("B");
        let c = team("C");
        let d = team("D");
        // A and B: 4 points, +2 each; B scored more. C and D: 1 point, -2 each; D scored more.
        let matches = vec![
            MatchResult::finished(key, a.clone(), c.clone(), 2, 0),
            MatchResult::finished(key, b.clone(), d.clone(), 3, 1),
            MatchResult::finished(key, c.clone(), b.clone(), 0, 0),
            MatchResult::finished(key, d.clone(), a.clone(), 0, 0),
        ];

        let table = calculate(key, &matches).unwrap();
        let names: Vec<&str> = table.iter().map(|r| r.team_name.as_str()).collect();
        assert_eq!(names, vec!["B", "A", "D", "C"]);
    }

    #[test]
    fn teams_without_finished_games_are_zero_filled() {
        let key = test_key();
        let a = team("A");
        let b = team("B");
        let c = team("C");
        let matches = vec![
            MatchResult::finished(key, a.clone(), b.clone(), 2, 1),
            MatchResult::planned(key, c.clone(), a.clone()),
            MatchResult::planned(key, b.clone(), c.clone()).with_status(MatchStatus::Postponed),
        ];

        let table = calculate(key, &matches).unwrap();
        assert_eq!(table.len(), 3);

        let c_row = row_for(&table, &c);
        assert_eq!(c_row.played, 0);
        assert_eq!(c_row.points, 0);
        assert_eq!(c_row.position, 2);
    }

    #[test]
    fn duplicate_display_names_still_order_totally() {
        let key = test_key();
        let first = team("City");
        let second = team("City");
        let matches = vec![MatchResult::finished(key, first.clone(), second.clone(), 0, 0)];

        let table = calculate(key, &matches).unwrap();
        assert_eq!(compare_rows(&table[0], &table[1]), Ordering::Less);
        assert!(table[0].team_id < table[1].team_id);
    }

    #[test]
    fn latest_record_decides_team_name() {
        let key = test_key();
        let id = TeamId::new();
        let other = team("Other");
        let matches = vec![
            MatchResult::finished(key, TeamRef::new(id, "New Name"), other.clone(), 1, 0)
                .with_matchday(2),
            MatchResult::finished(key, TeamRef::new(id, "Old Name"), other.clone(), 1, 0)
                .with_matchday(1),
        ];

        let table = calculate(key, &matches).unwrap();
        assert_eq!(table[0].team_name, "New Name");
    }

    #[test]
    fn foreign_match_is_a_calculation_error() {
        let key = test_key();
        let stray = MatchResult::finished(test_key(), team("A"), team("B"), 1, 0);
        let err = calculate(key, &[stray.clone()]).unwrap_err();
        assert_eq!(
            err,
            CalculationError::ForeignMatch {
                match_id: stray.match_id,
                expected: key
            }
        );
    }

    #[test]
    fn finished_without_score_is_a_calculation_error() {
        let key = test_key();
        let mut m = MatchResult::finished(key, team("A"), team("B"), 1, 0);
        m.away_goals = None;
        assert!(matches!(
            calculate(key, &[m]),
            Err(CalculationError::MissingScore { .. })
        ));
    }

    #[test]
    fn negative_score_is_a_calculation_error() {
        let key = test_key();
        let m = MatchResult::finished(key, team("A"), team("B"), 1, -2);
        assert!(matches!(
            calculate(key, &[m]),
            Err(CalculationError::NegativeScore { .. })
        ));
    }

    #[derive(Debug, Clone)]
    struct Fixture {
        home: usize,
        away_offset: usize,
        home_goals: i32,
        away_goals: i32,
        finished: bool,
    }

    fn fixture_strategy() -> impl Strategy<Value = Fixture> {
        (0usize..8, 0usize..7, 0i32..7, 0i32..7, prop::bool::weighted(0.8)).prop_map(
            |(home, away_offset, home_goals, away_goals, finished)| Fixture {
                home,
                away_offset,
                home_goals,
                away_goals,
                finished,
            },
        )
    }

    fn build_matches(key: LeagueSeasonKey, teams: &[TeamRef], fixtures: &[Fixture]) -> Vec<MatchResult> {
        let n = teams.len();
        fixtures
            .iter()
            .map(|f| {
                let home = f.home % n;
                let away = (home + 1 + f.away_offset % (n - 1)) % n;
                let m = MatchResult::finished(
                    key,
                    teams[home].clone(),
                    teams[away].clone(),
                    f.home_goals,
                    f.away_goals,
                );
                if f.finished {
                    m
                } else {
                    MatchResult::planned(key, teams[home].clone(), teams[away].clone())
                }
            })
            .collect()
    }

    fn league(size: usize) -> Vec<TeamRef> {
        ["Athletic", "Borough", "Celtic", "Dynamo", "Eagles", "Forest", "Green", "Hornets"]
            .iter()
            .take(size)
            .map(|name| team(name))
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: recomputation over the same input is byte-identical.
        #[test]
        fn calculation_is_idempotent(
            size in 2usize..8,
            fixtures in prop::collection::vec(fixture_strategy(), 0..40),
        ) {
            let key = test_key();
            let matches = build_matches(key, &league(size), &fixtures);

            let first = calculate(key, &matches).unwrap();
            let second = calculate(key, &matches).unwrap();

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(
                serde_json::to_vec(&first).unwrap(),
                serde_json::to_vec(&second).unwrap()
            );
        }

        /// Property: the table does not depend on the order matches are read in.
        #[test]
        fn calculation_ignores_input_order(
            size in 2usize..8,
            fixtures in prop::collection::vec(fixture_strategy(), 0..40),
        ) {
            let key = test_key();
            let matches = build_matches(key, &league(size), &fixtures);
            let mut reversed = matches.clone();
            reversed.reverse();

            prop_assert_eq!(calculate(key, &matches).unwrap(), calculate(key, &reversed).unwrap());
        }

        /// Property: every match awards 3 points (decisive) or 2 (draw).
        #[test]
        fn points_are_conserved(
            size in 2usize..8,
            fixtures in prop::collection::vec(fixture_strategy(), 0..40),
        ) {
            let key = test_key();
            let matches = build_matches(key, &league(size), &fixtures);
            let table = calculate(key, &matches).unwrap();

            let (mut decisive, mut drawn) = (0u32, 0u32);
            for m in matches.iter().filter(|m| m.is_finished()) {
                let (h, a) = m.score().unwrap();
                if h == a { drawn += 1 } else { decisive += 1 }
            }

            let total: u32 = table.iter().map(|r| r.points).sum();
            prop_assert_eq!(total, 3 * decisive + 2 * drawn);

            let goal_difference: i64 = table.iter().map(|r| r.goal_difference).sum();
            prop_assert_eq!(goal_difference, 0);

            for row in &table {
                prop_assert_eq!(row.played, row.wins + row.draws + row.losses);
            }
        }

        /// Property: ordering is strict; no two rows compare equal.
        #[test]
        fn ordering_is_total(
            size in 2usize..8,
            fixtures in prop::collection::vec(fixture_strategy(), 0..40),
        ) {
            let key = test_key();
            let table = calculate(key, &build_matches(key, &league(size), &fixtures)).unwrap();

            for pair in table.windows(2) {
                prop_assert_eq!(compare_rows(&pair[0], &pair[1]), Ordering::Less);
            }
            for (idx, row) in table.iter().enumerate() {
                prop_assert_eq!(row.position as usize, idx + 1);
            }
        }
    }
}
