use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::{Answer, AnswerPayload, Attempt};
use crate::db::types::{AttemptStatus, TestMode};
use crate::services::availability::WindowState;
use crate::services::classifier::EffectiveStatus;
use crate::services::sessions::{
    ActiveAttempt, AttemptHandle, AttemptHistory, AttemptSummary, FinalizeResult, SessionState,
};

/// Every timestamp leaves the service as RFC 3339 UTC.
#[derive(Debug, Serialize)]
pub(crate) struct SessionStateResponse {
    pub(crate) test_id: String,
    pub(crate) mode: TestMode,
    pub(crate) window: WindowState,
    pub(crate) opens_at: String,
    pub(crate) closes_at: String,
    pub(crate) total_time_seconds: i64,
    pub(crate) attempts_allowed: u32,
    pub(crate) attempts_used: u32,
    pub(crate) attempts_remaining: u32,
    pub(crate) can_start_new: bool,
    pub(crate) can_resume: bool,
    pub(crate) active_attempt: Option<ActiveAttemptResponse>,
    pub(crate) server_time: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ActiveAttemptResponse {
    pub(crate) attempt_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) end_time: String,
    pub(crate) remaining_seconds: i64,
}

impl From<ActiveAttempt> for ActiveAttemptResponse {
    fn from(active: ActiveAttempt) -> Self {
        Self {
            attempt_id: active.attempt_id,
            attempt_number: active.attempt_number,
            end_time: active.end_time.to_rfc3339(),
            remaining_seconds: active.remaining_seconds,
        }
    }
}

impl From<SessionState> for SessionStateResponse {
    fn from(state: SessionState) -> Self {
        Self {
            attempts_remaining: state.attempts_remaining(),
            can_resume: state.can_resume(),
            test_id: state.test_id,
            mode: state.mode,
            window: state.window,
            opens_at: state.opens_at.to_rfc3339(),
            closes_at: state.closes_at.to_rfc3339(),
            total_time_seconds: state.total_time_seconds,
            attempts_allowed: state.attempts_allowed,
            attempts_used: state.attempts_used,
            can_start_new: state.can_start_new,
            active_attempt: state.active.map(ActiveAttemptResponse::from),
            server_time: state.server_time.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) effective_status: EffectiveStatus,
    pub(crate) started_at: String,
    pub(crate) end_time: String,
    pub(crate) total_time_allowed_seconds: i64,
    pub(crate) submitted_at: Option<String>,
    pub(crate) score: Option<f64>,
}

impl AttemptResponse {
    pub(crate) fn new(attempt: Attempt, effective_status: EffectiveStatus) -> Self {
        Self {
            id: attempt.id,
            test_id: attempt.test_id,
            student_id: attempt.student_id,
            attempt_number: attempt.attempt_number,
            status: attempt.status,
            effective_status,
            started_at: attempt.started_at.to_rfc3339(),
            end_time: attempt.end_time.to_rfc3339(),
            total_time_allowed_seconds: attempt.total_time_allowed_seconds,
            submitted_at: attempt.submitted_at.map(|value| value.to_rfc3339()),
            score: attempt.score,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptHandleResponse {
    pub(crate) attempt: AttemptResponse,
    /// "created" or "resumed".
    pub(crate) outcome: &'static str,
    pub(crate) remaining_seconds: i64,
    pub(crate) server_time: String,
    pub(crate) answers: Vec<AnswerResponse>,
}

impl AttemptHandleResponse {
    pub(crate) fn new(handle: AttemptHandle, answers: Vec<Answer>) -> Self {
        Self {
            attempt: AttemptResponse::new(handle.attempt, EffectiveStatus::Active),
            outcome: handle.kind.as_str(),
            remaining_seconds: handle.remaining_seconds,
            server_time: handle.server_time.to_rfc3339(),
            answers: answers.into_iter().map(AnswerResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptDetailResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) remaining_seconds: i64,
    pub(crate) server_time: String,
    pub(crate) answers: Vec<AnswerResponse>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AnswerRequest {
    pub(crate) answer: AnswerPayload,
    /// Seconds spent on the question since the previous save. Negative
    /// values count as zero.
    #[serde(default)]
    pub(crate) time_spent_delta_seconds: i64,
    #[validate(range(min = 1, message = "revision must be at least 1"))]
    pub(crate) revision: i64,
    /// Advisory only; logged for clock-skew diagnostics.
    #[serde(default)]
    pub(crate) client_time: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) question_id: String,
    pub(crate) answer: AnswerPayload,
    pub(crate) time_spent_seconds: i64,
    pub(crate) revision: i64,
    pub(crate) updated_at: String,
}

impl From<Answer> for AnswerResponse {
    fn from(answer: Answer) -> Self {
        Self {
            question_id: answer.question_id,
            answer: answer.payload,
            time_spent_seconds: answer.time_spent_seconds,
            revision: answer.revision,
            updated_at: answer.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerSavedResponse {
    #[serde(flatten)]
    pub(crate) answer: AnswerResponse,
    /// False when the revision had already been stored.
    pub(crate) applied: bool,
    pub(crate) remaining_seconds: i64,
    pub(crate) server_time: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) already_finalized: bool,
}

impl From<FinalizeResult> for SubmitResponse {
    fn from(result: FinalizeResult) -> Self {
        Self {
            attempt: AttemptResponse::new(result.attempt, EffectiveStatus::Completed),
            already_finalized: !result.transitioned,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptSummaryResponse {
    pub(crate) attempt_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) effective_status: EffectiveStatus,
    pub(crate) started_at: String,
    pub(crate) end_time: String,
    pub(crate) submitted_at: Option<String>,
    pub(crate) remaining_seconds: i64,
    pub(crate) score: Option<f64>,
}

impl From<AttemptSummary> for AttemptSummaryResponse {
    fn from(summary: AttemptSummary) -> Self {
        Self {
            attempt_id: summary.attempt_id,
            attempt_number: summary.attempt_number,
            status: summary.status,
            effective_status: summary.effective_status,
            started_at: summary.started_at.to_rfc3339(),
            end_time: summary.end_time.to_rfc3339(),
            submitted_at: summary.submitted_at.map(|value| value.to_rfc3339()),
            remaining_seconds: summary.remaining_seconds,
            score: summary.score,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptHistoryResponse {
    pub(crate) test_id: String,
    pub(crate) attempt_count: usize,
    pub(crate) best_score: Option<f64>,
    pub(crate) latest_status: Option<EffectiveStatus>,
    pub(crate) attempts: Vec<AttemptSummaryResponse>,
}

impl AttemptHistoryResponse {
    pub(crate) fn new(test_id: String, history: AttemptHistory) -> Self {
        Self {
            test_id,
            attempt_count: history.attempts.len(),
            best_score: history.best_score,
            latest_status: history.latest_status,
            attempts: history.attempts.into_iter().map(AttemptSummaryResponse::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_request_parses_tagged_payload() {
        let raw = serde_json::json!({
            "answer": { "kind": "choice", "option_id": "b" },
            "time_spent_delta_seconds": 12,
            "revision": 3,
            "client_time": 1_735_812_030_500_i64
        });
        let request: AnswerRequest = serde_json::from_value(raw).expect("parse");
        assert_eq!(request.answer, AnswerPayload::Choice { option_id: "b".to_string() });
        assert_eq!(request.time_spent_delta_seconds, 12);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn answer_request_requires_positive_revision() {
        let raw = serde_json::json!({
            "answer": { "kind": "text", "content": "benzene" },
            "revision": 0
        });
        let request: AnswerRequest = serde_json::from_value(raw).expect("parse");
        assert_eq!(request.time_spent_delta_seconds, 0);
        assert!(request.validate().is_err());
    }
}
