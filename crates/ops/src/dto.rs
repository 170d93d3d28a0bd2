use serde::{Deserialize, Serialize};

use matchday_core::{LeagueId, LeagueSeasonKey, SeasonId};
use matchday_infra::jobs::SubmitReceipt;

use crate::errors::OpsError;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 500;
pub const MAX_DESCRIPTION_LEN: usize = 500;

// -------------------------
// Request DTOs
// -------------------------

/// Identifies one table. Ids arrive as strings from the outer layer.
#[derive(Debug, Clone, Deserialize)]
pub struct TableRef {
    pub league_id: String,
    pub season_id: String,
}

impl TableRef {
    pub fn new(key: LeagueSeasonKey) -> Self {
        Self {
            league_id: key.league_id.to_string(),
            season_id: key.season_id.to_string(),
        }
    }

    pub fn key(&self) -> Result<LeagueSeasonKey, OpsError> {
        let league_id: LeagueId = self.league_id.trim().parse()?;
        let season_id: SeasonId = self.season_id.trim().parse()?;
        Ok(LeagueSeasonKey::new(league_id, season_id))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerRequest {
    #[serde(flatten)]
    pub table: TableRef,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerAllRequest {
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSnapshotRequest {
    #[serde(flatten)]
    pub table: TableRef,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub league_id: Option<String>,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn league(&self) -> Result<Option<LeagueId>, OpsError> {
        self.league_id
            .as_deref()
            .map(|s| s.trim().parse().map_err(OpsError::from))
            .transpose()
    }

    /// Requested limit, clamped to `1..=MAX_HISTORY_LIMIT`.
    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

/// Trimmed description; blank becomes `None`.
pub fn normalize_description(description: Option<&str>) -> Result<Option<String>, OpsError> {
    let Some(d) = description.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if d.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(OpsError::invalid(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(Some(d.to_string()))
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    pub receipts: Vec<SubmitReceipt>,
}
