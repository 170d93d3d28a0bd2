//! `matchday-ops`: operator surface and process wiring.
//!
//! `OperationsFacade` is the programmatic admin interface (manual triggers,
//! queue status, history, snapshots, dead letters, pause/resume). An outer
//! API layer maps `OpsError::code()` to its own status codes.

pub mod cli;
pub mod dto;
pub mod engine;
pub mod errors;
pub mod facade;

pub use engine::{Engine, Stores};
pub use errors::OpsError;
pub use facade::OperationsFacade;
