//! Attempt lifecycle for a (test, student) pair: start or resume, answer
//! recording, finalization and expiry. Every decision about whether an
//! attempt is still running goes through [`classify`] against a caller
//! supplied `now`.

mod errors;
mod finalize;
mod start;
mod state;
mod summary;


use std::sync::Arc;

use crate::core::time::Timestamp;
use crate::db::models::{Answer, AnswerPayload, Attempt, Test};
use crate::repositories::store::{AttemptStore, TestCatalog};
use crate::services::answer_journal::{AnswerJournal, JournalEntry, JournalError, JournalOutcome};
use crate::services::classifier::{classify, EffectiveStatus};
use crate::services::scoring::Scorer;

pub(crate) use errors::SessionError;
pub(crate) use finalize::FinalizeResult;
pub(crate) use start::{AttemptHandle, StartKind};
pub(crate) use state::{ActiveAttempt, SessionState};
pub(crate) use summary::{AttemptHistory, AttemptSummary};

/// A single answer write as received from a client.
#[derive(Debug, Clone)]
pub(crate) struct AnswerSubmission {
    pub(crate) question_id: String,
    pub(crate) payload: AnswerPayload,
    pub(crate) delta_time_spent_seconds: i64,
    pub(crate) revision: i64,
}

#[derive(Clone)]
pub(crate) struct SessionManager {
    tests: Arc<dyn TestCatalog>,
    attempts: Arc<dyn AttemptStore>,
    journal: AnswerJournal,
    scorer: Arc<dyn Scorer>,
}

impl SessionManager {
    pub(crate) fn new(
        tests: Arc<dyn TestCatalog>,
        attempts: Arc<dyn AttemptStore>,
        journal: AnswerJournal,
        scorer: Arc<dyn Scorer>,
    ) -> Self {
        Self { tests, attempts, journal, scorer }
    }

    pub(crate) async fn get_test(&self, test_id: &str) -> Result<Test, SessionError> {
        self.tests.get_test(test_id).await?.ok_or(SessionError::TestNotFound)
    }

    pub(crate) async fn get_attempt(&self, attempt_id: &str) -> Result<Attempt, SessionError> {
        self.attempts.find(attempt_id).await?.ok_or(SessionError::AttemptNotFound)
    }

    pub(crate) async fn ping(&self) -> Result<(), SessionError> {
        Ok(self.attempts.ping().await?)
    }

    /// Saves one answer into an active attempt. Content replaces the stored
    /// answer; time spent accumulates. A replayed revision returns the stored
    /// answer unchanged.
    pub(crate) async fn record_answer(
        &self,
        attempt_id: &str,
        submission: AnswerSubmission,
        now: Timestamp,
    ) -> Result<JournalOutcome, SessionError> {
        let attempt = self.get_attempt(attempt_id).await?;
        match classify(&attempt, now) {
            EffectiveStatus::Active => {}
            other => return Err(SessionError::AttemptNotActive(other)),
        }

        let test = self.get_test(&attempt.test_id).await?;
        if !test.has_question(&submission.question_id) {
            return Err(SessionError::UnknownQuestion(submission.question_id));
        }

        let entry = JournalEntry {
            attempt_id: attempt.id.clone(),
            question_id: submission.question_id,
            payload: submission.payload,
            delta_time_spent_seconds: submission.delta_time_spent_seconds,
            revision: submission.revision,
        };

        match self.journal.upsert(entry, attempt.total_time_allowed_seconds, now).await {
            Ok(outcome) => {
                if outcome.was_applied() {
                    metrics::counter!("answers_recorded_total").increment(1);
                } else {
                    tracing::debug!(
                        attempt_id = %attempt.id,
                        question_id = %outcome.answer().question_id,
                        revision = outcome.answer().revision,
                        "Ignored replayed answer revision"
                    );
                }
                Ok(outcome)
            }
            // The attempt closed between the classify above and the write.
            Err(JournalError::AttemptClosed) => {
                let current = self.get_attempt(attempt_id).await?;
                Err(SessionError::AttemptNotActive(classify(&current, now)))
            }
            Err(JournalError::Invalid(message)) => Err(SessionError::InvalidAnswer(message)),
            Err(JournalError::Store(err)) => Err(err.into()),
        }
    }

    /// Answers stored for an attempt, ordered by question id.
    pub(crate) async fn list_answers(&self, attempt_id: &str) -> Result<Vec<Answer>, SessionError> {
        match self.journal.list(attempt_id).await {
            Ok(answers) => Ok(answers),
            Err(JournalError::Store(err)) => Err(err.into()),
            Err(other) => Err(SessionError::Unavailable(other.to_string())),
        }
    }
}
