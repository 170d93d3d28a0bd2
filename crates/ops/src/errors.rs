use serde_json::json;

use matchday_core::DomainError;
use matchday_infra::StoreError;
use matchday_infra::jobs::{JobStoreError, QueueError};
use matchday_infra::snapshots::SnapshotError;

/// Failure of an operator action.
#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OpsError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            OpsError::InvalidRequest(_) => "invalid_request",
            OpsError::Domain(DomainError::InvalidId(_)) => "invalid_id",
            OpsError::Domain(DomainError::InvalidKey { .. }) => "invalid_key",
            OpsError::Queue(QueueError::Store(JobStoreError::NotFound(_))) => "job_not_found",
            OpsError::Queue(QueueError::Store(JobStoreError::DuplicateActive(_))) => "conflict",
            OpsError::Queue(_) => "queue_error",
            OpsError::Snapshot(SnapshotError::NotFound(_)) => "snapshot_not_found",
            OpsError::Snapshot(SnapshotError::ChecksumMismatch { .. }) => "checksum_mismatch",
            OpsError::Snapshot(SnapshotError::Store(e)) | OpsError::Store(e) => store_code(e),
            OpsError::Snapshot(_) => "snapshot_error",
        }
    }

    /// Caller mistake rather than a system fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.code(),
            "invalid_request" | "invalid_id" | "invalid_key" | "job_not_found" | "snapshot_not_found"
        )
    }

    /// `{"error": code, "message": ...}` body for an outer API layer.
    pub fn to_json(&self) -> serde_json::Value {
        json_error(self.code(), self.to_string())
    }
}

fn store_code(err: &StoreError) -> &'static str {
    match err {
        StoreError::Unavailable(_) | StoreError::Poisoned => "store_unavailable",
        StoreError::Corrupt(_) => "store_corrupt",
    }
}

pub fn json_error(code: &'static str, message: impl Into<String>) -> serde_json::Value {
    json!({
        "error": code,
        "message": message.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchday_core::{JobId, SnapshotId};

    #[test]
    fn codes_are_stable() {
        let missing_job = OpsError::from(QueueError::Store(JobStoreError::NotFound(JobId::new())));
        assert_eq!(missing_job.code(), "job_not_found");
        assert!(missing_job.is_client_error());

        let corrupt = OpsError::from(SnapshotError::ChecksumMismatch {
            id: SnapshotId::new(),
            stored: "a".into(),
            computed: "b".into(),
        });
        assert_eq!(corrupt.code(), "checksum_mismatch");
        assert!(!corrupt.is_client_error());

        let down = OpsError::from(SnapshotError::Store(StoreError::Unavailable("db".into())));
        assert_eq!(down.code(), "store_unavailable");
    }

    #[test]
    fn json_body_carries_code_and_message() {
        let err = OpsError::from("nope".parse::<matchday_core::LeagueId>().unwrap_err());
        let body = err.to_json();
        assert_eq!(body["error"], "invalid_id");
        assert!(body["message"].as_str().unwrap().contains("LeagueId"));
    }
}
