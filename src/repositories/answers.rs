use sqlx::types::Json;
use sqlx::PgPool;

use crate::db::models::AnswerRow;
use crate::db::types::AttemptStatus;
use crate::repositories::store::AnswerWrite;

pub(crate) const COLUMNS: &str = "\
    attempt_id, question_id, response, time_spent_seconds, revision, created_at, updated_at";

/// Writes only while the owning attempt is in progress and before its deadline.
/// The attempt row is share-locked so a concurrent finalize cannot interleave.
/// Returns `None` when nothing was written: the attempt is closed or the
/// revision is not newer than the stored one.
pub(crate) async fn upsert(
    pool: &PgPool,
    write: &AnswerWrite,
) -> Result<Option<AnswerRow>, sqlx::Error> {
    let now = write.now.to_primitive();
    sqlx::query_as::<_, AnswerRow>(&format!(
        "INSERT INTO answers (
            attempt_id, question_id, response, time_spent_seconds, revision, created_at, updated_at
        )
        SELECT $1, $2, $3, $4, $5, $6, $6
        WHERE EXISTS (
            SELECT 1 FROM attempts
            WHERE id = $1 AND status = $7 AND end_time >= $6
            FOR SHARE
        )
        ON CONFLICT (attempt_id, question_id) DO UPDATE SET
            response = EXCLUDED.response,
            time_spent_seconds = answers.time_spent_seconds + EXCLUDED.time_spent_seconds,
            revision = EXCLUDED.revision,
            updated_at = EXCLUDED.updated_at
        WHERE answers.revision < EXCLUDED.revision
        RETURNING {COLUMNS}"
    ))
    .bind(&write.attempt_id)
    .bind(&write.question_id)
    .bind(Json(&write.payload))
    .bind(write.delta_time_spent_seconds)
    .bind(write.revision)
    .bind(now)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find(
    pool: &PgPool,
    attempt_id: &str,
    question_id: &str,
) -> Result<Option<AnswerRow>, sqlx::Error> {
    sqlx::query_as::<_, AnswerRow>(&format!(
        "SELECT {COLUMNS} FROM answers WHERE attempt_id = $1 AND question_id = $2"
    ))
    .bind(attempt_id)
    .bind(question_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_attempt(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<AnswerRow>, sqlx::Error> {
    sqlx::query_as::<_, AnswerRow>(&format!(
        "SELECT {COLUMNS} FROM answers WHERE attempt_id = $1 ORDER BY question_id"
    ))
    .bind(attempt_id)
    .fetch_all(pool)
    .await
}
