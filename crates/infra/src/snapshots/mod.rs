//! Table snapshots and rollback.
//!
//! Every recalculation captures the live table first, so any automatic change
//! can be reverted. Snapshots are immutable and carry a SHA-256 checksum that
//! is verified before a restore touches the live table.

pub mod postgres;
pub mod repository;
pub mod store;
pub mod types;

pub use postgres::PostgresSnapshotRepository;
pub use repository::{InMemorySnapshotRepository, SnapshotRepository};
pub use store::{RestoreReport, SnapshotStore};
pub use types::{
    RowChange, Snapshot, SnapshotDiff, SnapshotError, SnapshotRetention, SnapshotSummary, checksum,
};
