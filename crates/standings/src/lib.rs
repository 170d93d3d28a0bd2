//! `matchday-standings`
//!
//! **Responsibility:** the pure part of table automation.
//!
//! - `MatchResult` as read from the external match store
//! - single-match validation (`validate`)
//! - the standings calculation and its tie-break order (`calculate`)
//!
//! Nothing in this crate performs IO or holds shared state.

pub mod calculator;
pub mod match_result;
pub mod table;
pub mod validation;

pub use calculator::{CalculationError, RankCriterion, STANDARD_RANKING, calculate, compare_rows};
pub use match_result::{MatchResult, MatchStatus, TeamRef};
pub use table::{CounterOverflow, TableRow};
pub use validation::{ValidationErrorCode, ValidationIssue, ValidationReport, validate};
