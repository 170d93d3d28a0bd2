//! Postgres-backed match source.
//!
//! Reads the host system's `matches` table (or a view with the same columns).
//! Identity columns are nullable there, mirroring `MatchResult`.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};
use uuid::Uuid;

use matchday_core::{LeagueId, LeagueSeasonKey, MatchId, SeasonId, TeamId};
use matchday_standings::{MatchResult, MatchStatus, TeamRef};

use super::MatchSource;
use crate::error::{StoreError, map_sqlx_error};

#[derive(Debug, Clone)]
pub struct PostgresMatchSource {
    pool: PgPool,
}

impl PostgresMatchSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MatchSource for PostgresMatchSource {
    #[instrument(skip(self), fields(key = %key, operation), err)]
    async fn matches_for(&self, key: LeagueSeasonKey) -> Result<Vec<MatchResult>, StoreError> {
        Span::current().record("operation", "load_matches");

        let rows = sqlx::query(
            r#"
            SELECT
                match_id,
                league_id,
                season_id,
                home_team_id,
                home_team_name,
                away_team_id,
                away_team_name,
                home_goals,
                away_goals,
                status,
                matchday
            FROM matches
            WHERE league_id = $1 AND season_id = $2
            "#,
        )
        .bind(key.league_id.as_uuid())
        .bind(key.season_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_matches", e))?;

        rows.iter()
            .map(|r| match_from_pg(r).map_err(|e| map_sqlx_error("decode_match", e)))
            .collect()
    }

    #[instrument(skip(self), fields(operation), err)]
    async fn known_keys(&self) -> Result<Vec<LeagueSeasonKey>, StoreError> {
        Span::current().record("operation", "known_keys");

        let rows = sqlx::query(
            r#"
            SELECT DISTINCT league_id, season_id
            FROM matches
            WHERE league_id IS NOT NULL AND season_id IS NOT NULL
            ORDER BY league_id, season_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("known_keys", e))?;

        rows.iter()
            .map(|r| {
                let league: Uuid = r.try_get("league_id")?;
                let season: Uuid = r.try_get("season_id")?;
                Ok(LeagueSeasonKey::new(
                    LeagueId::from_uuid(league),
                    SeasonId::from_uuid(season),
                ))
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("decode_key", e))
    }
}

fn parse_status(raw: &str) -> Result<MatchStatus, sqlx::Error> {
    match raw {
        "planned" => Ok(MatchStatus::Planned),
        "finished" => Ok(MatchStatus::Finished),
        "cancelled" => Ok(MatchStatus::Cancelled),
        "postponed" => Ok(MatchStatus::Postponed),
        other => Err(sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: format!("unknown match status {other:?}").into(),
        }),
    }
}

fn team(row: &PgRow, id_column: &str, name_column: &str) -> Result<Option<TeamRef>, sqlx::Error> {
    let id: Option<Uuid> = row.try_get(id_column)?;
    let name: Option<String> = row.try_get(name_column)?;
    Ok(id.map(|id| TeamRef::new(TeamId::from_uuid(id), name.unwrap_or_default())))
}

fn match_from_pg(row: &PgRow) -> Result<MatchResult, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(MatchResult {
        match_id: MatchId::from_uuid(row.try_get("match_id")?),
        league_id: row.try_get::<Option<Uuid>, _>("league_id")?.map(LeagueId::from_uuid),
        season_id: row.try_get::<Option<Uuid>, _>("season_id")?.map(SeasonId::from_uuid),
        home_team: team(row, "home_team_id", "home_team_name")?,
        away_team: team(row, "away_team_id", "away_team_name")?,
        home_goals: row.try_get("home_goals")?,
        away_goals: row.try_get("away_goals")?,
        status: parse_status(&status)?,
        matchday: row.try_get("matchday")?,
    })
}
