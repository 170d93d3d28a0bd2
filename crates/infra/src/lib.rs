//! Infrastructure for table automation: job queue, snapshots, stores,
//! lifecycle adapter, audit and configuration.
//!
//! Every store is a trait with an in-memory implementation (tests, single
//! process) and a Postgres one (`sqlx`).

pub mod audit;
pub mod config;
pub mod error;
pub mod jobs;
pub mod lifecycle;
pub mod locks;
pub mod matches;
pub mod read_model;
pub mod snapshots;
pub mod workers;

pub use audit::{AuditAction, AuditEntry, AuditSink, InMemoryAuditLog, TracingAuditSink};
pub use config::{AutomationConfig, ConfigError};
pub use error::StoreError;
pub use locks::{KeyGuard, KeyLocks};

/// Schema for the Postgres stores (`migrations/`).
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
