use std::sync::Arc;

use tracing::{debug, info, warn};

use matchday_core::LeagueSeasonKey;
use matchday_standings::{MatchResult, MatchStatus, validate};

use super::{IgnoreReason, LifecycleError, LifecycleOutcome, MatchLifecycleHandler, RecalculationQueue};
use crate::jobs::{JobTrigger, Priority};

/// Turns match lifecycle notifications into recalculation requests.
///
/// With automation disabled the adapter still validates, but only reports
/// which keys would have been recalculated.
pub struct LifecycleAdapter {
    queue: Arc<dyn RecalculationQueue>,
    automation_enabled: bool,
}

impl LifecycleAdapter {
    pub fn new(queue: Arc<dyn RecalculationQueue>, automation_enabled: bool) -> Self {
        Self {
            queue,
            automation_enabled,
        }
    }

    pub fn automation_enabled(&self) -> bool {
        self.automation_enabled
    }

    fn reject_invalid(&self, m: &MatchResult) -> Result<(), LifecycleError> {
        let report = validate(m);
        if report.valid {
            return Ok(());
        }
        warn!(match_id = %m.match_id, errors = %report, "match rejected");
        Err(LifecycleError::Rejected(report))
    }

    fn enqueue(
        &self,
        keys: Vec<LeagueSeasonKey>,
        trigger: JobTrigger,
    ) -> Result<LifecycleOutcome, LifecycleError> {
        if keys.is_empty() {
            return Ok(LifecycleOutcome::Ignored {
                reason: IgnoreReason::MissingReference,
            });
        }

        if !self.automation_enabled {
            info!(?keys, ?trigger, "automation disabled; recalculation left to operators");
            return Ok(LifecycleOutcome::ManualOnly { keys });
        }

        let mut receipts = Vec::with_capacity(keys.len());
        for key in keys {
            let receipt = self.queue.enqueue(key, Priority::Normal, trigger.clone())?;
            debug!(
                job_id = %receipt.job_id,
                key = %key,
                disposition = ?receipt.disposition,
                "recalculation enqueued"
            );
            receipts.push(receipt);
        }
        Ok(LifecycleOutcome::Enqueued { receipts })
    }
}

/// Current key first; the previous one too when the match moved.
fn affected_keys(current: Option<LeagueSeasonKey>, previous: Option<LeagueSeasonKey>) -> Vec<LeagueSeasonKey> {
    let mut keys: Vec<_> = current.into_iter().collect();
    if let Some(previous) = previous {
        if !keys.contains(&previous) {
            keys.push(previous);
        }
    }
    keys
}

impl MatchLifecycleHandler for LifecycleAdapter {
    fn on_match_finished(&self, current: &MatchResult) -> Result<LifecycleOutcome, LifecycleError> {
        self.reject_invalid(current)?;
        self.enqueue(
            affected_keys(current.key(), None),
            JobTrigger::MatchFinished {
                match_id: current.match_id,
            },
        )
    }

    fn on_match_corrected(
        &self,
        current: &MatchResult,
        previous: &MatchResult,
    ) -> Result<LifecycleOutcome, LifecycleError> {
        self.reject_invalid(current)?;

        // The old key only needs work if the old version was counted there.
        let previous_key = previous.is_finished().then(|| previous.key()).flatten();
        self.enqueue(
            affected_keys(current.key(), previous_key),
            JobTrigger::MatchCorrected {
                match_id: current.match_id,
            },
        )
    }

    fn on_match_deleted(&self, previous: &MatchResult) -> Result<LifecycleOutcome, LifecycleError> {
        self.enqueue(
            affected_keys(previous.key(), None),
            JobTrigger::MatchDeleted {
                match_id: previous.match_id,
            },
        )
    }

    fn on_match_saved(
        &self,
        current: &MatchResult,
        previous: Option<&MatchResult>,
    ) -> Result<LifecycleOutcome, LifecycleError> {
        let was_finished = previous.is_some_and(|p| p.status == MatchStatus::Finished);

        match (current.status == MatchStatus::Finished, previous) {
            (true, Some(previous)) if was_finished => {
                if current.affects_table_differently(previous) {
                    self.on_match_corrected(current, previous)
                } else {
                    debug!(match_id = %current.match_id, "save does not affect the table");
                    Ok(LifecycleOutcome::Ignored {
                        reason: IgnoreReason::Unchanged,
                    })
                }
            }
            (true, _) => self.on_match_finished(current),
            (false, Some(previous)) if was_finished => {
                // The old result must disappear from the table.
                self.enqueue(
                    affected_keys(previous.key(), None),
                    JobTrigger::MatchReopened {
                        match_id: current.match_id,
                    },
                )
            }
            (false, _) => Ok(LifecycleOutcome::Ignored {
                reason: IgnoreReason::NotFinished,
            }),
        }
    }
}
