use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::db::models::Attempt;
use crate::repositories::store::EnrollmentDirectory;
use crate::services::sessions::SessionError;

/// Authenticated student, identified by the token subject.
#[derive(Debug, Clone)]
pub(crate) struct CurrentStudent {
    pub(crate) id: String,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStudent {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        Ok(CurrentStudent { id: claims.sub })
    }
}

/// Runs before any session logic for the test.
pub(crate) async fn require_enrollment(
    state: &AppState,
    student: &CurrentStudent,
    test_id: &str,
) -> Result<(), ApiError> {
    let enrolled = state
        .enrollments()
        .is_enrolled(&student.id, test_id)
        .await
        .map_err(|e| ApiError::from(SessionError::from(e)))?;

    if enrolled {
        Ok(())
    } else {
        tracing::info!(student_id = %student.id, test_id, "Rejected request from non-enrolled student");
        Err(SessionError::NotEnrolled.into())
    }
}

/// Loads an attempt owned by `student`, then re-checks enrollment for its test.
pub(crate) async fn require_attempt_owner(
    state: &AppState,
    student: &CurrentStudent,
    attempt_id: &str,
) -> Result<Attempt, ApiError> {
    let attempt = state.sessions().get_attempt(attempt_id).await?;
    if attempt.student_id != student.id {
        return Err(ApiError::forbidden("Attempt belongs to another student"));
    }
    require_enrollment(state, student, &attempt.test_id).await?;
    Ok(attempt)
}
