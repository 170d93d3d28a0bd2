//! Inbound match lifecycle handling.
//!
//! The host content store calls `MatchLifecycleHandler` (directly, or through
//! the bus-driven `LifecycleWorker`). The adapter validates the record and
//! turns the change into recalculation requests.

pub mod adapter;

use std::sync::Arc;

use serde::Serialize;

use matchday_core::LeagueSeasonKey;
use matchday_events::MatchLifecycleEvent;
use matchday_standings::{MatchResult, ValidationReport};

use crate::jobs::{JobTrigger, Priority, QueueError, QueueManager, SubmitReceipt};

pub use adapter::LifecycleAdapter;

/// Where lifecycle decisions are sent.
pub trait RecalculationQueue: Send + Sync {
    fn enqueue(
        &self,
        key: LeagueSeasonKey,
        priority: Priority,
        trigger: JobTrigger,
    ) -> Result<SubmitReceipt, QueueError>;
}

impl RecalculationQueue for QueueManager {
    fn enqueue(
        &self,
        key: LeagueSeasonKey,
        priority: Priority,
        trigger: JobTrigger,
    ) -> Result<SubmitReceipt, QueueError> {
        self.submit(key, priority, trigger)
    }
}

impl<Q> RecalculationQueue for Arc<Q>
where
    Q: RecalculationQueue + ?Sized,
{
    fn enqueue(
        &self,
        key: LeagueSeasonKey,
        priority: Priority,
        trigger: JobTrigger,
    ) -> Result<SubmitReceipt, QueueError> {
        (**self).enqueue(key, priority, trigger)
    }
}

/// Why a notification produced no work.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Neither version of the match counts for the table.
    NotFinished,
    /// The save did not touch anything the table depends on.
    Unchanged,
    /// No league/season to recalculate.
    MissingReference,
}

/// What the adapter did with a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LifecycleOutcome {
    Enqueued { receipts: Vec<SubmitReceipt> },
    Ignored { reason: IgnoreReason },
    /// Automation is disabled; these keys would have been recalculated.
    ManualOnly { keys: Vec<LeagueSeasonKey> },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    #[error("match rejected: {0}")]
    Rejected(ValidationReport),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Callbacks for changes to match records.
pub trait MatchLifecycleHandler: Send + Sync {
    /// A match reached the finished status.
    fn on_match_finished(&self, current: &MatchResult) -> Result<LifecycleOutcome, LifecycleError>;

    /// An already finished match was edited.
    fn on_match_corrected(
        &self,
        current: &MatchResult,
        previous: &MatchResult,
    ) -> Result<LifecycleOutcome, LifecycleError>;

    fn on_match_deleted(&self, previous: &MatchResult) -> Result<LifecycleOutcome, LifecycleError>;

    /// Generic save; classified into one of the callbacks above.
    fn on_match_saved(
        &self,
        current: &MatchResult,
        previous: Option<&MatchResult>,
    ) -> Result<LifecycleOutcome, LifecycleError>;

    fn handle(&self, event: &MatchLifecycleEvent) -> Result<LifecycleOutcome, LifecycleError> {
        match event {
            MatchLifecycleEvent::Saved {
                current, previous, ..
            } => self.on_match_saved(current, previous.as_ref()),
            MatchLifecycleEvent::Finished { current, .. } => self.on_match_finished(current),
            MatchLifecycleEvent::Corrected {
                current, previous, ..
            } => self.on_match_corrected(current, previous),
            MatchLifecycleEvent::Deleted { previous, .. } => self.on_match_deleted(previous),
        }
    }
}

impl<H> MatchLifecycleHandler for Arc<H>
where
    H: MatchLifecycleHandler + ?Sized,
{
    fn on_match_finished(&self, current: &MatchResult) -> Result<LifecycleOutcome, LifecycleError> {
        (**self).on_match_finished(current)
    }

    fn on_match_corrected(
        &self,
        current: &MatchResult,
        previous: &MatchResult,
    ) -> Result<LifecycleOutcome, LifecycleError> {
        (**self).on_match_corrected(current, previous)
    }

    fn on_match_deleted(&self, previous: &MatchResult) -> Result<LifecycleOutcome, LifecycleError> {
        (**self).on_match_deleted(previous)
    }

    fn on_match_saved(
        &self,
        current: &MatchResult,
        previous: Option<&MatchResult>,
    ) -> Result<LifecycleOutcome, LifecycleError> {
        (**self).on_match_saved(current, previous)
    }
}
