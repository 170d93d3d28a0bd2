//! Single-match validation.
//!
//! Validation is pure and total: every well-typed `MatchResult` produces a
//! `ValidationReport`, and every failing rule contributes its own issue.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::match_result::{MatchResult, MatchStatus};

/// Stable, machine-readable validation error codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorCode {
    #[error("home score is required for a finished match")]
    MissingHomeScore,
    #[error("away score is required for a finished match")]
    MissingAwayScore,
    #[error("home score must not be negative")]
    NegativeHomeScore,
    #[error("away score must not be negative")]
    NegativeAwayScore,
    #[error("home and away team must differ")]
    SameTeam,
    #[error("league reference is missing")]
    MissingLeague,
    #[error("season reference is missing")]
    MissingSeason,
    #[error("home team reference is missing")]
    MissingHomeTeam,
    #[error("away team reference is missing")]
    MissingAwayTeam,
    #[error("matchday must be a positive integer")]
    InvalidMatchday,
}

impl ValidationErrorCode {
    /// The match field the code refers to.
    pub fn field(self) -> &'static str {
        match self {
            Self::MissingHomeScore | Self::NegativeHomeScore => "home_goals",
            Self::MissingAwayScore | Self::NegativeAwayScore => "away_goals",
            Self::SameTeam => "away_team",
            Self::MissingLeague => "league_id",
            Self::MissingSeason => "season_id",
            Self::MissingHomeTeam => "home_team",
            Self::MissingAwayTeam => "away_team",
            Self::InvalidMatchday => "matchday",
        }
    }
}

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: ValidationErrorCode,
    pub field: String,
    pub message: String,
}

impl From<ValidationErrorCode> for ValidationIssue {
    fn from(code: ValidationErrorCode) -> Self {
        Self {
            code,
            field: code.field().to_string(),
            message: code.to_string(),
        }
    }
}

/// Outcome of validating one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn from_codes(codes: Vec<ValidationErrorCode>) -> Self {
        Self {
            valid: codes.is_empty(),
            errors: codes.into_iter().map(ValidationIssue::from).collect(),
        }
    }

    pub fn codes(&self) -> Vec<ValidationErrorCode> {
        self.errors.iter().map(|e| e.code).collect()
    }

    pub fn has(&self, code: ValidationErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

impl core::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.valid {
            return f.write_str("valid");
        }
        let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
        f.write_str(&messages.join("; "))
    }
}

/// Validate a single match result.
///
/// Rules, in reporting order:
/// 1. both scores present and non-negative when the status is finished
/// 2. home team differs from away team
/// 3. league, season and team references are present
/// 4. matchday, if present, is positive
pub fn validate(m: &MatchResult) -> ValidationReport {
    let mut codes = Vec::new();

    if m.status == MatchStatus::Finished {
        match m.home_goals {
            None => codes.push(ValidationErrorCode::MissingHomeScore),
            Some(g) if g < 0 => codes.push(ValidationErrorCode::NegativeHomeScore),
            Some(_) => {}
        }
        match m.away_goals {
            None => codes.push(ValidationErrorCode::MissingAwayScore),
            Some(g) if g < 0 => codes.push(ValidationErrorCode::NegativeAwayScore),
            Some(_) => {}
        }
    }

    if let (Some(home), Some(away)) = (&m.home_team, &m.away_team) {
        if home.id == away.id {
            codes.push(ValidationErrorCode::SameTeam);
        }
    }

    if m.league_id.is_none() {
        codes.push(ValidationErrorCode::MissingLeague);
    }
    if m.season_id.is_none() {
        codes.push(ValidationErrorCode::MissingSeason);
    }
    if m.home_team.is_none() {
        codes.push(ValidationErrorCode::MissingHomeTeam);
    }
    if m.away_team.is_none() {
        codes.push(ValidationErrorCode::MissingAwayTeam);
    }

    if matches!(m.matchday, Some(day) if day <= 0) {
        codes.push(ValidationErrorCode::InvalidMatchday);
    }

    ValidationReport::from_codes(codes)
}
