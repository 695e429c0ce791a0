use uuid::Uuid;

use crate::core::time::Timestamp;
use crate::db::models::{Attempt, Test};
use crate::db::types::FinalizeTrigger;
use crate::repositories::store::{CreateOutcome, NewAttempt};
use crate::services::availability::{attempt_deadline, WindowState};
use crate::services::classifier::{classify, remaining_seconds, EffectiveStatus};

use super::state::{active_attempt, evaluate};
use super::{SessionError, SessionManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartKind {
    Created,
    Resumed,
}

impl StartKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Resumed => "resumed",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AttemptHandle {
    pub(crate) attempt: Attempt,
    pub(crate) kind: StartKind,
    pub(crate) remaining_seconds: i64,
    pub(crate) server_time: Timestamp,
}

impl AttemptHandle {
    fn new(attempt: Attempt, kind: StartKind, now: Timestamp) -> Self {
        let remaining_seconds = remaining_seconds(&attempt, now);
        Self { attempt, kind, remaining_seconds, server_time: now }
    }
}

impl SessionManager {
    /// Resumes the pair's active attempt or creates a new one. Concurrent
    /// calls for the same pair all end up on the same attempt.
    pub(crate) async fn start_or_resume(
        &self,
        test_id: &str,
        student_id: &str,
        now: Timestamp,
    ) -> Result<AttemptHandle, SessionError> {
        let test = self.get_test(test_id).await?;
        let mut attempts = self.attempts.list_for_pair(test_id, student_id).await?;

        // Persist expiry first so a stale in-progress row cannot block the
        // next attempt.
        let expired: Vec<Attempt> = attempts
            .iter()
            .filter(|attempt| classify(attempt, now) == EffectiveStatus::Expired)
            .cloned()
            .collect();
        if !expired.is_empty() {
            for attempt in expired {
                self.finalize_attempt(attempt, now, FinalizeTrigger::AutoExpire).await?;
            }
            attempts = self.attempts.list_for_pair(test_id, student_id).await?;
        }

        let state = evaluate(&test, student_id, &attempts, now);
        if state.window != WindowState::Open {
            return Err(deny(&test, student_id, SessionError::WindowClosed(state.window)));
        }

        if let Some(active) = active_attempt(&attempts, now) {
            return Ok(self.resumed(active.clone(), now));
        }

        if state.attempts_used >= state.attempts_allowed {
            return Err(deny(
                &test,
                student_id,
                SessionError::QuotaExhausted {
                    used: state.attempts_used,
                    allowed: state.attempts_allowed,
                },
            ));
        }

        let next_number =
            attempts.iter().map(|attempt| attempt.attempt_number).max().unwrap_or(0) + 1;
        let new_attempt = NewAttempt {
            id: Uuid::new_v4().to_string(),
            test_id: test.id.clone(),
            student_id: student_id.to_string(),
            attempt_number: next_number,
            started_at: now,
            total_time_allowed_seconds: test.total_time_seconds,
            end_time: attempt_deadline(&test, now),
        };

        match self.attempts.create_in_progress(new_attempt).await? {
            CreateOutcome::Created(attempt) => {
                tracing::info!(
                    attempt_id = %attempt.id,
                    test_id = %attempt.test_id,
                    student_id = %attempt.student_id,
                    attempt_number = attempt.attempt_number,
                    end_time = %attempt.end_time,
                    "Attempt started"
                );
                metrics::counter!("attempts_started_total").increment(1);
                Ok(AttemptHandle::new(attempt, StartKind::Created, now))
            }
            CreateOutcome::Conflict => {
                // Another request won the race; resume whatever it created.
                let attempts = self.attempts.list_for_pair(test_id, student_id).await?;
                match active_attempt(&attempts, now) {
                    Some(winner) => Ok(self.resumed(winner.clone(), now)),
                    None => {
                        tracing::warn!(
                            test_id = %test.id,
                            student_id,
                            "Attempt creation conflicted but no active attempt was found"
                        );
                        Err(SessionError::StoreConflict)
                    }
                }
            }
        }
    }

    fn resumed(&self, attempt: Attempt, now: Timestamp) -> AttemptHandle {
        tracing::debug!(attempt_id = %attempt.id, "Attempt resumed");
        metrics::counter!("attempts_resumed_total").increment(1);
        AttemptHandle::new(attempt, StartKind::Resumed, now)
    }
}

fn deny(test: &Test, student_id: &str, err: SessionError) -> SessionError {
    tracing::info!(test_id = %test.id, student_id, reason = err.code(), "Attempt start denied");
    metrics::counter!("attempt_start_denied_total", "reason" => err.code()).increment(1);
    err
}
