use crate::core::time::Timestamp;
use crate::db::models::Attempt;
use crate::db::types::{AttemptStatus, FinalizeTrigger};
use crate::repositories::store::OverdueCursor;
use crate::services::scoring::ScoringRequest;

use super::{SessionError, SessionManager};

/// Outcome of one sweep page.
#[derive(Debug, Default)]
pub(crate) struct SweepBatch {
    /// Overdue attempts the page returned, closed or not.
    pub(crate) listed: usize,
    pub(crate) closed: usize,
    pub(crate) failed: usize,
    /// Where the next page starts; `None` when the page was empty.
    pub(crate) next: Option<OverdueCursor>,
}

#[derive(Debug, Clone)]
pub(crate) struct FinalizeResult {
    pub(crate) attempt: Attempt,
    /// False when the attempt was already final before this call.
    pub(crate) transitioned: bool,
}

impl SessionManager {
    /// Idempotent: finalizing a final attempt returns it unchanged, whatever
    /// the trigger.
    pub(crate) async fn finalize(
        &self,
        attempt_id: &str,
        now: Timestamp,
        trigger: FinalizeTrigger,
    ) -> Result<FinalizeResult, SessionError> {
        let attempt = self.get_attempt(attempt_id).await?;
        self.finalize_attempt(attempt, now, trigger).await
    }

    pub(super) async fn finalize_attempt(
        &self,
        attempt: Attempt,
        now: Timestamp,
        trigger: FinalizeTrigger,
    ) -> Result<FinalizeResult, SessionError> {
        if attempt.status.is_final() {
            return Ok(FinalizeResult { attempt, transitioned: false });
        }

        let status = match trigger {
            FinalizeTrigger::UserSubmit if now <= attempt.end_time => AttemptStatus::Submitted,
            _ => AttemptStatus::AutoSubmitted,
        };

        match self.attempts.complete(&attempt.id, status, now).await? {
            Some(finalized) => {
                tracing::info!(
                    attempt_id = %finalized.id,
                    test_id = %finalized.test_id,
                    status = finalized.status.as_str(),
                    trigger = trigger.as_str(),
                    "Attempt finalized"
                );
                metrics::counter!("attempts_finalized_total", "status" => finalized.status.as_str())
                    .increment(1);
                self.spawn_scoring(finalized.clone(), now);
                Ok(FinalizeResult { attempt: finalized, transitioned: true })
            }
            None => {
                // Lost the race to a concurrent finalize; report its result.
                let current = self.get_attempt(&attempt.id).await?;
                if current.status.is_final() {
                    Ok(FinalizeResult { attempt: current, transitioned: false })
                } else {
                    Err(SessionError::StoreConflict)
                }
            }
        }
    }

    /// Sweeps one page of stored in-progress attempts whose deadline has
    /// passed, starting after `after`. Failures are logged and skipped.
    pub(crate) async fn close_expired(
        &self,
        now: Timestamp,
        after: Option<&OverdueCursor>,
        batch_size: i64,
    ) -> Result<SweepBatch, SessionError> {
        let overdue = self.attempts.list_overdue(now, after, batch_size).await?;
        let mut batch = SweepBatch {
            listed: overdue.len(),
            next: overdue.last().map(OverdueCursor::after),
            ..SweepBatch::default()
        };

        for attempt in overdue {
            let attempt_id = attempt.id.clone();
            match self.finalize_attempt(attempt, now, FinalizeTrigger::AutoExpire).await {
                Ok(result) if result.transitioned => batch.closed += 1,
                Ok(_) => {}
                Err(err) => {
                    batch.failed += 1;
                    tracing::error!(attempt_id = %attempt_id, error = %err, "Failed to close expired attempt");
                }
            }
        }

        Ok(batch)
    }

    /// Runs the scorer off the request path. Only the call that performed the
    /// transition gets here, so each attempt is scored once.
    fn spawn_scoring(&self, attempt: Attempt, now: Timestamp) {
        let journal = self.journal.clone();
        let tests = self.tests.clone();
        let scorer = self.scorer.clone();
        let attempts = self.attempts.clone();

        tokio::spawn(async move {
            let answers = match journal.list(&attempt.id).await {
                Ok(answers) => answers,
                Err(err) => {
                    tracing::error!(attempt_id = %attempt.id, error = %err, "Failed to load answers for scoring");
                    return;
                }
            };

            let max_score = match tests.get_test(&attempt.test_id).await {
                Ok(test) => test.map(|test| test.max_score()),
                Err(err) => {
                    tracing::warn!(attempt_id = %attempt.id, error = %err, "Failed to load test for scoring");
                    None
                }
            };

            match scorer.score(ScoringRequest::new(&attempt, max_score, answers)).await {
                Ok(Some(score)) => {
                    if let Err(err) = attempts.record_score(&attempt.id, score, now).await {
                        tracing::error!(attempt_id = %attempt.id, error = %err, "Failed to store score");
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    metrics::counter!("scoring_failures_total").increment(1);
                    tracing::warn!(attempt_id = %attempt.id, error = %err, "Scoring failed");
                }
            }
        });
    }
}
