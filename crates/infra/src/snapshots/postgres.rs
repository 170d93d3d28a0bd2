//! Postgres-backed snapshot repository.
//!
//! Rows are stored as JSONB. The checksum is always recomputed from the
//! decoded rows, so JSONB key reordering does not affect verification.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};
use uuid::Uuid;

use matchday_core::{LeagueId, LeagueSeasonKey, SeasonId, SnapshotId};
use matchday_standings::TableRow;

use super::repository::SnapshotRepository;
use super::types::{Snapshot, SnapshotSummary};
use crate::error::{StoreError, map_sqlx_error};

#[derive(Debug, Clone)]
pub struct PostgresSnapshotRepository {
    pool: PgPool,
}

impl PostgresSnapshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SnapshotRepository for PostgresSnapshotRepository {
    #[instrument(skip(self, snapshot), fields(snapshot_id = %snapshot.id, key = %snapshot.key, operation), err)]
    async fn insert(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        Span::current().record("operation", "insert_snapshot");

        let rows = serde_json::to_value(&snapshot.rows)
            .map_err(|e| StoreError::Corrupt(format!("encode snapshot rows: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO standings_snapshots (
                snapshot_id,
                league_id,
                season_id,
                rows,
                row_count,
                checksum,
                description,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(snapshot.id.as_uuid())
        .bind(snapshot.key.league_id.as_uuid())
        .bind(snapshot.key.season_id.as_uuid())
        .bind(rows)
        .bind(snapshot.rows.len() as i32)
        .bind(&snapshot.checksum)
        .bind(&snapshot.description)
        .bind(snapshot.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_snapshot", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(snapshot_id = %id, operation), err)]
    async fn get(&self, id: SnapshotId) -> Result<Option<Snapshot>, StoreError> {
        Span::current().record("operation", "get_snapshot");

        let row = sqlx::query(
            r#"
            SELECT snapshot_id, league_id, season_id, rows, checksum, description, created_at
            FROM standings_snapshots
            WHERE snapshot_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_snapshot", e))?;

        row.map(|r| snapshot_from_pg(&r)).transpose()
    }

    #[instrument(skip(self), fields(key = %key, operation), err)]
    async fn list(&self, key: LeagueSeasonKey) -> Result<Vec<SnapshotSummary>, StoreError> {
        Span::current().record("operation", "list_snapshots");

        let rows = sqlx::query(
            r#"
            SELECT snapshot_id, description, checksum, row_count, created_at
            FROM standings_snapshots
            WHERE league_id = $1 AND season_id = $2
            ORDER BY created_at DESC, snapshot_id DESC
            "#,
        )
        .bind(key.league_id.as_uuid())
        .bind(key.season_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_snapshots", e))?;

        rows.iter()
            .map(|r| {
                let row_count: i32 = r.try_get("row_count")?;
                Ok(SnapshotSummary {
                    id: SnapshotId::from_uuid(r.try_get("snapshot_id")?),
                    key,
                    description: r.try_get("description")?,
                    checksum: r.try_get("checksum")?,
                    row_count: row_count.max(0) as usize,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| map_sqlx_error("decode_snapshot_summary", e))
    }

    #[instrument(skip(self, ids), fields(count = ids.len(), operation), err)]
    async fn delete(&self, ids: &[SnapshotId]) -> Result<usize, StoreError> {
        Span::current().record("operation", "delete_snapshots");

        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let result = sqlx::query("DELETE FROM standings_snapshots WHERE snapshot_id = ANY($1)")
            .bind(&uuids)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_snapshots", e))?;

        Ok(result.rows_affected() as usize)
    }
}

fn snapshot_from_pg(row: &PgRow) -> Result<Snapshot, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_snapshot", e);

    let rows_json: serde_json::Value = row.try_get("rows").map_err(decode)?;
    let rows: Vec<TableRow> = serde_json::from_value(rows_json)
        .map_err(|e| StoreError::Corrupt(format!("snapshot rows: {e}")))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;

    Ok(Snapshot {
        id: SnapshotId::from_uuid(row.try_get("snapshot_id").map_err(decode)?),
        key: LeagueSeasonKey::new(
            LeagueId::from_uuid(row.try_get("league_id").map_err(decode)?),
            SeasonId::from_uuid(row.try_get("season_id").map_err(decode)?),
        ),
        rows,
        checksum: row.try_get("checksum").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        created_at,
    })
}
