use sqlx::PgPool;

use crate::core::time::Timestamp;
use crate::db::models::AttemptRow;
use crate::db::types::AttemptStatus;
use crate::repositories::store::{NewAttempt, OverdueCursor};

pub(crate) const COLUMNS: &str = "\
    id, test_id, student_id, attempt_number, status, started_at, \
    total_time_allowed_seconds, end_time, submitted_at, score, created_at, updated_at";

/// Relies on the partial unique index over in-progress attempts: a second
/// insert for the same pair is dropped instead of raising.
pub(crate) async fn create_in_progress(
    pool: &PgPool,
    attempt: &NewAttempt,
) -> Result<Option<AttemptRow>, sqlx::Error> {
    let started_at = attempt.started_at.to_primitive();
    sqlx::query_as::<_, AttemptRow>(&format!(
        "INSERT INTO attempts (
            id, test_id, student_id, attempt_number, status, started_at,
            total_time_allowed_seconds, end_time, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$6,$6)
        ON CONFLICT DO NOTHING
        RETURNING {COLUMNS}"
    ))
    .bind(&attempt.id)
    .bind(&attempt.test_id)
    .bind(&attempt.student_id)
    .bind(attempt.attempt_number)
    .bind(AttemptStatus::InProgress)
    .bind(started_at)
    .bind(attempt.total_time_allowed_seconds)
    .bind(attempt.end_time.to_primitive())
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<AttemptRow>, sqlx::Error> {
    sqlx::query_as::<_, AttemptRow>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_by_test_and_student(
    pool: &PgPool,
    test_id: &str,
    student_id: &str,
) -> Result<Vec<AttemptRow>, sqlx::Error> {
    sqlx::query_as::<_, AttemptRow>(&format!(
        "SELECT {COLUMNS} FROM attempts \
         WHERE test_id = $1 AND student_id = $2 \
         ORDER BY attempt_number"
    ))
    .bind(test_id)
    .bind(student_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn complete(
    pool: &PgPool,
    id: &str,
    status: AttemptStatus,
    submitted_at: Timestamp,
) -> Result<Option<AttemptRow>, sqlx::Error> {
    let submitted_at = submitted_at.to_primitive();
    sqlx::query_as::<_, AttemptRow>(&format!(
        "UPDATE attempts SET status = $1, submitted_at = $2, updated_at = $2 \
         WHERE id = $3 AND status = $4 \
         RETURNING {COLUMNS}"
    ))
    .bind(status)
    .bind(submitted_at)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn set_score(
    pool: &PgPool,
    id: &str,
    score: f64,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE attempts SET score = $1, updated_at = $2 WHERE id = $3")
        .bind(score)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Keyset page over overdue attempts. Rows at or before `after` are skipped,
/// so an attempt that keeps failing to close never blocks the ones behind it.
pub(crate) async fn list_overdue(
    pool: &PgPool,
    now: Timestamp,
    after: Option<&OverdueCursor>,
    limit: i64,
) -> Result<Vec<AttemptRow>, sqlx::Error> {
    sqlx::query_as::<_, AttemptRow>(&format!(
        "SELECT {COLUMNS} FROM attempts \
         WHERE status = $1 AND end_time < $2 \
           AND ($3::timestamp IS NULL OR (end_time, id) > ($3, $4)) \
         ORDER BY end_time, id \
         LIMIT $5"
    ))
    .bind(AttemptStatus::InProgress)
    .bind(now.to_primitive())
    .bind(after.map(|cursor| cursor.end_time.to_primitive()))
    .bind(after.map(|cursor| cursor.attempt_id.as_str()))
    .bind(limit.clamp(1, 10_000))
    .fetch_all(pool)
    .await
}
