use async_trait::async_trait;
use sqlx::PgPool;

use crate::core::time::Timestamp;
use crate::db::models::{Answer, Attempt, Test};
use crate::db::types::AttemptStatus;
use crate::repositories::store::{
    AnswerStore, AnswerWrite, AttemptStore, CreateOutcome, EnrollmentDirectory, NewAttempt,
    OverdueCursor, StoreError, TestCatalog, UpsertOutcome,
};
use crate::repositories::{answers, attempts, enrollments, health, test_definitions};

/// Postgres-backed implementation of every store contract.
#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TestCatalog for PgStore {
    async fn get_test(&self, test_id: &str) -> Result<Option<Test>, StoreError> {
        let Some(row) = test_definitions::find_by_id(&self.pool, test_id).await? else {
            return Ok(None);
        };
        let questions = test_definitions::list_questions(&self.pool, test_id).await?;
        test_definitions::assemble(row, questions).map(Some)
    }
}

#[async_trait]
impl EnrollmentDirectory for PgStore {
    async fn is_enrolled(&self, student_id: &str, test_id: &str) -> Result<bool, StoreError> {
        Ok(enrollments::is_enrolled(&self.pool, student_id, test_id).await?)
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn create_in_progress(&self, attempt: NewAttempt) -> Result<CreateOutcome, StoreError> {
        match attempts::create_in_progress(&self.pool, &attempt).await? {
            Some(row) => Ok(CreateOutcome::Created(row.into())),
            None => Ok(CreateOutcome::Conflict),
        }
    }

    async fn find(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError> {
        Ok(attempts::find_by_id(&self.pool, attempt_id).await?.map(Attempt::from))
    }

    async fn list_for_pair(
        &self,
        test_id: &str,
        student_id: &str,
    ) -> Result<Vec<Attempt>, StoreError> {
        let rows = attempts::list_by_test_and_student(&self.pool, test_id, student_id).await?;
        Ok(rows.into_iter().map(Attempt::from).collect())
    }

    async fn complete(
        &self,
        attempt_id: &str,
        status: AttemptStatus,
        submitted_at: Timestamp,
    ) -> Result<Option<Attempt>, StoreError> {
        Ok(attempts::complete(&self.pool, attempt_id, status, submitted_at)
            .await?
            .map(Attempt::from))
    }

    async fn record_score(
        &self,
        attempt_id: &str,
        score: f64,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        attempts::set_score(&self.pool, attempt_id, score, now.to_primitive()).await?;
        Ok(())
    }

    async fn list_overdue(
        &self,
        now: Timestamp,
        after: Option<&OverdueCursor>,
        limit: i64,
    ) -> Result<Vec<Attempt>, StoreError> {
        let rows = attempts::list_overdue(&self.pool, now, after, limit).await?;
        Ok(rows.into_iter().map(Attempt::from).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(health::ping(&self.pool).await?)
    }
}

#[async_trait]
impl AnswerStore for PgStore {
    async fn upsert(&self, write: AnswerWrite) -> Result<UpsertOutcome, StoreError> {
        if let Some(row) = answers::upsert(&self.pool, &write).await? {
            return Ok(UpsertOutcome::Applied(row.into()));
        }

        // Nothing written: either a replayed revision or a closed attempt.
        let existing = answers::find(&self.pool, &write.attempt_id, &write.question_id).await?;
        match existing {
            Some(row) if row.revision >= write.revision => Ok(UpsertOutcome::Duplicate(row.into())),
            _ => Ok(UpsertOutcome::AttemptClosed),
        }
    }

    async fn list_for_attempt(&self, attempt_id: &str) -> Result<Vec<Answer>, StoreError> {
        let rows = answers::list_by_attempt(&self.pool, attempt_id).await?;
        Ok(rows.into_iter().map(Answer::from).collect())
    }
}
