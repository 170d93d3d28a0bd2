//! Postgres-backed standings repository.
//!
//! Rows live in `standings_rows` keyed by `(league_id, season_id, team_id)`.
//! `replace` runs delete + inserts in one transaction, so concurrent readers
//! see either the previous table or the new one.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use matchday_core::{LeagueId, LeagueSeasonKey, SeasonId, TeamId};
use matchday_standings::TableRow;

use super::StandingsRepository;
use crate::error::{StoreError, map_sqlx_error};

#[derive(Debug, Clone)]
pub struct PostgresStandingsRepository {
    pool: PgPool,
}

impl PostgresStandingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl StandingsRepository for PostgresStandingsRepository {
    #[instrument(skip(self), fields(key = %key, operation), err)]
    async fn load(&self, key: LeagueSeasonKey) -> Result<Vec<TableRow>, StoreError> {
        Span::current().record("operation", "load_standings");

        let rows = sqlx::query(
            r#"
            SELECT
                league_id,
                season_id,
                team_id,
                team_name,
                played,
                wins,
                draws,
                losses,
                goals_for,
                goals_against,
                goal_difference,
                points,
                position,
                auto_calculated
            FROM standings_rows
            WHERE league_id = $1 AND season_id = $2
            ORDER BY position ASC, team_id ASC
            "#,
        )
        .bind(key.league_id.as_uuid())
        .bind(key.season_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_standings", e))?;

        rows.iter()
            .map(|r| table_row_from_pg(r).map_err(|e| map_sqlx_error("decode_standings", e)))
            .collect()
    }

    #[instrument(skip(self, rows), fields(key = %key, row_count = rows.len(), operation), err)]
    async fn replace(&self, key: LeagueSeasonKey, rows: &[TableRow]) -> Result<(), StoreError> {
        Span::current().record("operation", "replace_standings");

        if let Some(foreign) = rows.iter().find(|r| r.key() != key) {
            return Err(StoreError::Corrupt(format!(
                "row for team {} belongs to {}, not {key}",
                foreign.team_id,
                foreign.key()
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("DELETE FROM standings_rows WHERE league_id = $1 AND season_id = $2")
            .bind(key.league_id.as_uuid())
            .bind(key.season_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_standings", e))?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO standings_rows (
                    league_id,
                    season_id,
                    team_id,
                    team_name,
                    played,
                    wins,
                    draws,
                    losses,
                    goals_for,
                    goals_against,
                    goal_difference,
                    points,
                    position,
                    auto_calculated
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(row.league_id.as_uuid())
            .bind(row.season_id.as_uuid())
            .bind(row.team_id.as_uuid())
            .bind(&row.team_name)
            .bind(to_i32(row.played)?)
            .bind(to_i32(row.wins)?)
            .bind(to_i32(row.draws)?)
            .bind(to_i32(row.losses)?)
            .bind(to_i32(row.goals_for)?)
            .bind(to_i32(row.goals_against)?)
            .bind(row.goal_difference)
            .bind(to_i32(row.points)?)
            .bind(to_i32(row.position)?)
            .bind(row.auto_calculated)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_standings_row", e))?;
        }

        // Dropping `tx` before this point rolls everything back.
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(())
    }
}

fn to_i32(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("counter {value} out of range")))
}

fn from_i32(row: &PgRow, column: &str) -> Result<u32, sqlx::Error> {
    let value: i32 = row.try_get(column)?;
    u32::try_from(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn table_row_from_pg(row: &PgRow) -> Result<TableRow, sqlx::Error> {
    Ok(TableRow {
        league_id: LeagueId::from_uuid(row.try_get("league_id")?),
        season_id: SeasonId::from_uuid(row.try_get("season_id")?),
        team_id: TeamId::from_uuid(row.try_get("team_id")?),
        team_name: row.try_get("team_name")?,
        played: from_i32(row, "played")?,
        wins: from_i32(row, "wins")?,
        draws: from_i32(row, "draws")?,
        losses: from_i32(row, "losses")?,
        goals_for: from_i32(row, "goals_for")?,
        goals_against: from_i32(row, "goals_against")?,
        goal_difference: row.try_get("goal_difference")?,
        points: from_i32(row, "points")?,
        position: from_i32(row, "position")?,
        auto_calculated: row.try_get("auto_calculated")?,
    })
}
