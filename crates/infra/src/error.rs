//! Errors shared by the store adapters.

use thiserror::Error;

/// Failure reported by a match, standings or snapshot store.
///
/// All store failures are treated as transient by the job queue: the external
/// store is expected to recover, so the job is retried with backoff.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("stored data is malformed: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Map sqlx errors to `StoreError`.
///
/// | sqlx error | StoreError |
/// |------------|------------|
/// | `ColumnDecode`, `Decode`, `ColumnNotFound` | `Corrupt` |
/// | anything else | `Unavailable` |
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("{operation}: {err}"))
        }
        sqlx::Error::Database(db_err) => {
            StoreError::Unavailable(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => StoreError::Unavailable(format!("connection pool closed in {operation}")),
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}
