use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::core::time::Timestamp;
use crate::db::types::{AttemptStatus, TestMode};

#[derive(Debug, Clone, FromRow)]
pub(crate) struct TestRow {
    pub(crate) id: String,
    pub(crate) class_id: String,
    pub(crate) title: String,
    pub(crate) mode: TestMode,
    pub(crate) total_time_seconds: i64,
    pub(crate) join_time: Option<PrimitiveDateTime>,
    pub(crate) end_time: Option<PrimitiveDateTime>,
    pub(crate) opens_at: Option<PrimitiveDateTime>,
    pub(crate) closes_at: Option<PrimitiveDateTime>,
    pub(crate) attempts_allowed: Option<i32>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct TestQuestionRow {
    pub(crate) test_id: String,
    pub(crate) question_id: String,
    pub(crate) position: i32,
    pub(crate) points: f64,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct AttemptRow {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) total_time_allowed_seconds: i64,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) score: Option<f64>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct AnswerRow {
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) response: Json<AnswerPayload>,
    pub(crate) time_spent_seconds: i64,
    pub(crate) revision: i64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Test definition as seen by the session core. Read-only during attempts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Test {
    pub(crate) id: String,
    pub(crate) class_id: String,
    pub(crate) title: String,
    pub(crate) total_time_seconds: i64,
    pub(crate) schedule: TestSchedule,
    pub(crate) questions: Vec<QuestionRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TestSchedule {
    /// One broadcast window shared by every student.
    Live { join_time: Timestamp, end_time: Timestamp },
    Flexible { opens_at: Timestamp, closes_at: Timestamp, attempts_allowed: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuestionRef {
    pub(crate) question_id: String,
    pub(crate) points: f64,
}

impl Test {
    pub(crate) fn mode(&self) -> TestMode {
        match self.schedule {
            TestSchedule::Live { .. } => TestMode::Live,
            TestSchedule::Flexible { .. } => TestMode::Flexible,
        }
    }

    pub(crate) fn has_question(&self, question_id: &str) -> bool {
        self.questions.iter().any(|question| question.question_id == question_id)
    }

    pub(crate) fn max_score(&self) -> f64 {
        self.questions.iter().map(|question| question.points).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: Timestamp,
    pub(crate) total_time_allowed_seconds: i64,
    /// Fixed at creation; later edits to the test never move it.
    pub(crate) end_time: Timestamp,
    pub(crate) submitted_at: Option<Timestamp>,
    pub(crate) score: Option<f64>,
}

impl From<AttemptRow> for Attempt {
    fn from(row: AttemptRow) -> Self {
        Self {
            id: row.id,
            test_id: row.test_id,
            student_id: row.student_id,
            attempt_number: row.attempt_number,
            status: row.status,
            started_at: Timestamp::from_primitive(row.started_at),
            total_time_allowed_seconds: row.total_time_allowed_seconds,
            end_time: Timestamp::from_primitive(row.end_time),
            submitted_at: row.submitted_at.map(Timestamp::from_primitive),
            score: row.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum AnswerPayload {
    Choice { option_id: String },
    Text { content: String },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Answer {
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) payload: AnswerPayload,
    pub(crate) time_spent_seconds: i64,
    pub(crate) revision: i64,
    pub(crate) updated_at: Timestamp,
}

impl From<AnswerRow> for Answer {
    fn from(row: AnswerRow) -> Self {
        Self {
            attempt_id: row.attempt_id,
            question_id: row.question_id,
            payload: row.response.0,
            time_spent_seconds: row.time_spent_seconds,
            revision: row.revision,
            updated_at: Timestamp::from_primitive(row.updated_at),
        }
    }
}
