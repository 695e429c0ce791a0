mod handlers;

#[cfg(test)]
mod tests;

use axum::routing::{get, post, put};
use axum::Router;

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/tests/:test_id/session",
            get(handlers::get_session_state).post(handlers::start_or_resume),
        )
        .route("/tests/:test_id/attempts", get(handlers::list_attempts))
        .route("/attempts/:attempt_id", get(handlers::get_attempt))
        .route("/attempts/:attempt_id/answers/:question_id", put(handlers::record_answer))
        .route("/attempts/:attempt_id/submit", post(handlers::submit_attempt))
}
