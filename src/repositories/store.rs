use async_trait::async_trait;
use thiserror::Error;

use crate::core::time::Timestamp;
use crate::db::models::{Answer, AnswerPayload, Attempt, Test};
use crate::db::types::AttemptStatus;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NewAttempt {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) started_at: Timestamp,
    pub(crate) total_time_allowed_seconds: i64,
    pub(crate) end_time: Timestamp,
}

#[derive(Debug)]
pub(crate) enum CreateOutcome {
    Created(Attempt),
    /// The pair already had an in-progress attempt, or the attempt number was taken.
    Conflict,
}

#[derive(Debug, Clone)]
pub(crate) struct AnswerWrite {
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) payload: AnswerPayload,
    pub(crate) delta_time_spent_seconds: i64,
    pub(crate) revision: i64,
    /// Writes are rejected once the attempt is past this instant or no longer in progress.
    pub(crate) now: Timestamp,
}

/// Position in the overdue listing, which is ordered by `(end_time, id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OverdueCursor {
    pub(crate) end_time: Timestamp,
    pub(crate) attempt_id: String,
}

impl OverdueCursor {
    pub(crate) fn after(attempt: &Attempt) -> Self {
        Self { end_time: attempt.end_time, attempt_id: attempt.id.clone() }
    }
}

#[derive(Debug)]
pub(crate) enum UpsertOutcome {
    Applied(Answer),
    /// Revision not newer than the stored one; nothing changed.
    Duplicate(Answer),
    AttemptClosed,
}

#[async_trait]
pub(crate) trait TestCatalog: Send + Sync {
    async fn get_test(&self, test_id: &str) -> Result<Option<Test>, StoreError>;
}

#[async_trait]
pub(crate) trait EnrollmentDirectory: Send + Sync {
    async fn is_enrolled(&self, student_id: &str, test_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub(crate) trait AttemptStore: Send + Sync {
    /// Inserts an in-progress attempt unless one already exists for the pair.
    /// Check and insert happen as one atomic step.
    async fn create_in_progress(&self, attempt: NewAttempt) -> Result<CreateOutcome, StoreError>;

    async fn find(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError>;

    async fn list_for_pair(
        &self,
        test_id: &str,
        student_id: &str,
    ) -> Result<Vec<Attempt>, StoreError>;

    /// Moves an in-progress attempt to a final status. Returns `None` when the
    /// attempt was not in progress anymore.
    async fn complete(
        &self,
        attempt_id: &str,
        status: AttemptStatus,
        submitted_at: Timestamp,
    ) -> Result<Option<Attempt>, StoreError>;

    async fn record_score(
        &self,
        attempt_id: &str,
        score: f64,
        now: Timestamp,
    ) -> Result<(), StoreError>;

    /// Stored in-progress attempts whose deadline is strictly before `now`,
    /// ordered by `(end_time, id)` and starting strictly after `after`.
    async fn list_overdue(
        &self,
        now: Timestamp,
        after: Option<&OverdueCursor>,
        limit: i64,
    ) -> Result<Vec<Attempt>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub(crate) trait AnswerStore: Send + Sync {
    async fn upsert(&self, write: AnswerWrite) -> Result<UpsertOutcome, StoreError>;

    async fn list_for_attempt(&self, attempt_id: &str) -> Result<Vec<Answer>, StoreError>;
}
