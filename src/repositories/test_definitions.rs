use sqlx::PgPool;

use crate::core::time::Timestamp;
use crate::db::models::{QuestionRef, Test, TestQuestionRow, TestRow, TestSchedule};
use crate::db::types::TestMode;
use crate::repositories::store::StoreError;

pub(crate) const COLUMNS: &str = "\
    id, class_id, title, mode, total_time_seconds, join_time, end_time, \
    opens_at, closes_at, attempts_allowed, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<TestRow>, sqlx::Error> {
    sqlx::query_as::<_, TestRow>(&format!("SELECT {COLUMNS} FROM tests WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_questions(
    pool: &PgPool,
    test_id: &str,
) -> Result<Vec<TestQuestionRow>, sqlx::Error> {
    sqlx::query_as::<_, TestQuestionRow>(
        "SELECT test_id, question_id, position, points FROM test_questions \
         WHERE test_id = $1 ORDER BY position, question_id",
    )
    .bind(test_id)
    .fetch_all(pool)
    .await
}

/// Builds the domain test from its rows, rejecting rows whose mode-specific
/// columns are missing.
pub(crate) fn assemble(row: TestRow, questions: Vec<TestQuestionRow>) -> Result<Test, StoreError> {
    let corrupt = |what: &str| StoreError::Corrupt(format!("test {}: {what}", row.id));

    let schedule = match row.mode {
        TestMode::Live => {
            let join_time = row.join_time.ok_or_else(|| corrupt("live test without join_time"))?;
            let end_time = row.end_time.ok_or_else(|| corrupt("live test without end_time"))?;
            TestSchedule::Live {
                join_time: Timestamp::from_primitive(join_time),
                end_time: Timestamp::from_primitive(end_time),
            }
        }
        TestMode::Flexible => {
            let opens_at = row.opens_at.ok_or_else(|| corrupt("flexible test without opens_at"))?;
            let closes_at =
                row.closes_at.ok_or_else(|| corrupt("flexible test without closes_at"))?;
            let attempts_allowed = row
                .attempts_allowed
                .filter(|value| *value >= 1)
                .ok_or_else(|| corrupt("flexible test without a positive attempts_allowed"))?;
            TestSchedule::Flexible {
                opens_at: Timestamp::from_primitive(opens_at),
                closes_at: Timestamp::from_primitive(closes_at),
                attempts_allowed: attempts_allowed as u32,
            }
        }
    };

    if row.total_time_seconds <= 0 {
        return Err(corrupt("non-positive total_time_seconds"));
    }

    Ok(Test {
        id: row.id,
        class_id: row.class_id,
        title: row.title,
        total_time_seconds: row.total_time_seconds,
        schedule,
        questions: questions
            .into_iter()
            .map(|question| QuestionRef { question_id: question.question_id, points: question.points })
            .collect(),
    })
}
