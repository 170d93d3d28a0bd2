//! `matchday-core`: shared building blocks for the table automation engine.
//!
//! This crate contains identifiers, the domain error model and the clock
//! abstraction. It has no infrastructure concerns.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{JobId, LeagueId, LeagueSeasonKey, MatchId, SeasonId, SnapshotId, TeamId};
