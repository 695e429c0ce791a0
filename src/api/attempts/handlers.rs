use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_attempt_owner, require_enrollment, CurrentStudent};
use crate::core::state::AppState;
use crate::core::time::{parse_client_timestamp, Timestamp};
use crate::db::types::FinalizeTrigger;
use crate::schemas::attempt::{
    AnswerRequest, AnswerResponse, AnswerSavedResponse, AttemptDetailResponse,
    AttemptHandleResponse, AttemptHistoryResponse, AttemptResponse, SessionStateResponse,
    SubmitResponse,
};
use crate::services::classifier::{classify, remaining_seconds};
use crate::services::sessions::{AnswerSubmission, StartKind};

const ANSWER_RATE_WINDOW_SECONDS: u64 = 60;
/// Client clocks further off than this get logged.
const CLIENT_SKEW_LOG_THRESHOLD_SECONDS: i64 = 30;

pub(super) async fn get_session_state(
    State(state): State<AppState>,
    student: CurrentStudent,
    Path(test_id): Path<String>,
) -> Result<Json<SessionStateResponse>, ApiError> {
    require_enrollment(&state, &student, &test_id).await?;

    let session = state.sessions().get_session_state(&test_id, &student.id, state.now()).await?;
    Ok(Json(session.into()))
}

pub(super) async fn start_or_resume(
    State(state): State<AppState>,
    student: CurrentStudent,
    Path(test_id): Path<String>,
) -> Result<(StatusCode, Json<AttemptHandleResponse>), ApiError> {
    require_enrollment(&state, &student, &test_id).await?;

    let handle = state.sessions().start_or_resume(&test_id, &student.id, state.now()).await?;
    let (status, answers) = match handle.kind {
        StartKind::Created => (StatusCode::CREATED, Vec::new()),
        StartKind::Resumed => {
            (StatusCode::OK, state.sessions().list_answers(&handle.attempt.id).await?)
        }
    };

    Ok((status, Json(AttemptHandleResponse::new(handle, answers))))
}

pub(super) async fn list_attempts(
    State(state): State<AppState>,
    student: CurrentStudent,
    Path(test_id): Path<String>,
) -> Result<Json<AttemptHistoryResponse>, ApiError> {
    require_enrollment(&state, &student, &test_id).await?;

    let history =
        state.sessions().list_attempt_summaries(&test_id, &student.id, state.now()).await?;
    Ok(Json(AttemptHistoryResponse::new(test_id, history)))
}

pub(super) async fn get_attempt(
    State(state): State<AppState>,
    student: CurrentStudent,
    Path(attempt_id): Path<String>,
) -> Result<Json<AttemptDetailResponse>, ApiError> {
    let attempt = require_attempt_owner(&state, &student, &attempt_id).await?;
    let now = state.now();
    let answers = state.sessions().list_answers(&attempt.id).await?;

    let effective = classify(&attempt, now);
    let remaining = remaining_seconds(&attempt, now);
    Ok(Json(AttemptDetailResponse {
        attempt: AttemptResponse::new(attempt, effective),
        remaining_seconds: remaining,
        server_time: now.to_rfc3339(),
        answers: answers.into_iter().map(AnswerResponse::from).collect(),
    }))
}

pub(super) async fn record_answer(
    State(state): State<AppState>,
    student: CurrentStudent,
    Path((attempt_id, question_id)): Path<(String, String)>,
    Json(payload): Json<AnswerRequest>,
) -> Result<Json<AnswerSavedResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::bad_request(e.to_string()))?;
    let attempt = require_attempt_owner(&state, &student, &attempt_id).await?;

    let rate_key = format!("rl:answers:{}", attempt.id);
    let allowed = state
        .redis()
        .rate_limit(
            &rate_key,
            state.settings().sessions().answer_rate_limit_per_minute,
            ANSWER_RATE_WINDOW_SECONDS,
        )
        .await
        .unwrap_or(true);
    if !allowed {
        return Err(ApiError::TooManyRequests("Too many answer saves, slow down"));
    }

    let now = state.now();
    if let Some(client_time) = payload.client_time.as_ref().and_then(parse_client_timestamp) {
        log_client_skew(&attempt.id, client_time, now);
    }

    let outcome = state
        .sessions()
        .record_answer(
            &attempt.id,
            AnswerSubmission {
                question_id,
                payload: payload.answer,
                delta_time_spent_seconds: payload.time_spent_delta_seconds,
                revision: payload.revision,
            },
            now,
        )
        .await?;

    let applied = outcome.was_applied();
    let answer = outcome.into_answer();

    Ok(Json(AnswerSavedResponse {
        answer: answer.into(),
        applied,
        remaining_seconds: remaining_seconds(&attempt, now),
        server_time: now.to_rfc3339(),
    }))
}

pub(super) async fn submit_attempt(
    State(state): State<AppState>,
    student: CurrentStudent,
    Path(attempt_id): Path<String>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let attempt = require_attempt_owner(&state, &student, &attempt_id).await?;

    let result =
        state.sessions().finalize(&attempt.id, state.now(), FinalizeTrigger::UserSubmit).await?;
    Ok(Json(result.into()))
}

fn log_client_skew(attempt_id: &str, client_time: Timestamp, server_time: Timestamp) {
    let skew_seconds = client_time.unix() - server_time.unix();
    if skew_seconds.abs() > CLIENT_SKEW_LOG_THRESHOLD_SECONDS {
        tracing::debug!(attempt_id, skew_seconds, "Client clock differs from server time");
    }
}
