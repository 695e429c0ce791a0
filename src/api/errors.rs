use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::availability::WindowState;
use crate::services::classifier::EffectiveStatus;
use crate::services::sessions::SessionError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    code: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden { code: &'static str, detail: &'static str },
    BadRequest { code: &'static str, detail: String },
    NotFound { code: &'static str, detail: String },
    Conflict { code: &'static str, detail: String, retryable: bool },
    TooManyRequests(&'static str),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    pub(crate) fn bad_request(detail: impl Into<String>) -> Self {
        Self::BadRequest { code: "invalid_request", detail: detail.into() }
    }

    pub(crate) fn forbidden(detail: &'static str) -> Self {
        Self::Forbidden { code: "forbidden", detail }
    }

    fn parts(self) -> (StatusCode, ErrorResponse) {
        let body = |status: StatusCode, code: &'static str, detail: String, retryable: bool| {
            (status, ErrorResponse { status: status.as_u16(), code, detail, retryable })
        };

        match self {
            ApiError::Unauthorized(detail) => {
                body(StatusCode::UNAUTHORIZED, "unauthorized", detail.to_string(), false)
            }
            ApiError::Forbidden { code, detail } => {
                body(StatusCode::FORBIDDEN, code, detail.to_string(), false)
            }
            ApiError::BadRequest { code, detail } => {
                body(StatusCode::BAD_REQUEST, code, detail, false)
            }
            ApiError::NotFound { code, detail } => body(StatusCode::NOT_FOUND, code, detail, false),
            ApiError::Conflict { code, detail, retryable } => {
                body(StatusCode::CONFLICT, code, detail, retryable)
            }
            ApiError::TooManyRequests(detail) => {
                body(StatusCode::TOO_MANY_REQUESTS, "rate_limited", detail.to_string(), true)
            }
            ApiError::ServiceUnavailable(detail) => {
                tracing::error!(error = %detail, "Service unavailable");
                body(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable",
                    "Service temporarily unavailable".to_string(),
                    true,
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal server error");
                body(StatusCode::INTERNAL_SERVER_ERROR, "internal", detail, false)
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let code = err.code();
        let retryable = err.is_retryable();
        match err {
            SessionError::WindowClosed(state) => ApiError::Conflict {
                code,
                detail: match state {
                    WindowState::NotYetOpen => "Test has not opened yet".to_string(),
                    _ => "Test is closed".to_string(),
                },
                retryable,
            },
            SessionError::QuotaExhausted { allowed, .. } => ApiError::Conflict {
                code,
                detail: format!("All {allowed} allowed attempts have been used"),
                retryable,
            },
            SessionError::AttemptNotActive(status) => ApiError::Conflict {
                code,
                detail: match status {
                    EffectiveStatus::Expired => "Attempt time is over".to_string(),
                    _ => "Attempt has already been submitted".to_string(),
                },
                retryable,
            },
            SessionError::StoreConflict => ApiError::Conflict {
                code,
                detail: "Another request started this attempt; retry".to_string(),
                retryable,
            },
            SessionError::NotEnrolled => {
                ApiError::Forbidden { code, detail: "Not enrolled in this test" }
            }
            SessionError::TestNotFound => {
                ApiError::NotFound { code, detail: "Test not found".to_string() }
            }
            SessionError::AttemptNotFound => {
                ApiError::NotFound { code, detail: "Attempt not found".to_string() }
            }
            SessionError::UnknownQuestion(question_id) => ApiError::BadRequest {
                code,
                detail: format!("Question {question_id} is not part of this test"),
            },
            SessionError::InvalidAnswer(detail) => ApiError::BadRequest { code, detail },
            SessionError::Unavailable(detail) => ApiError::ServiceUnavailable(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let unauthorized = matches!(self, ApiError::Unauthorized(_));
        let (status, body) = self.parts();
        let mut response = (status, Json(body)).into_response();
        if unauthorized {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
