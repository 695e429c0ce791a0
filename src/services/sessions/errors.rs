use thiserror::Error;

use crate::repositories::store::StoreError;
use crate::services::availability::WindowState;
use crate::services::classifier::EffectiveStatus;

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error("test is not available right now ({0:?})")]
    WindowClosed(WindowState),
    #[error("all {allowed} allowed attempts have been used")]
    QuotaExhausted { used: u32, allowed: u32 },
    #[error("attempt is not active ({0:?})")]
    AttemptNotActive(EffectiveStatus),
    #[error("student is not enrolled in this test")]
    NotEnrolled,
    #[error("a concurrent request created an attempt first; retry")]
    StoreConflict,
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    #[error("test not found")]
    TestNotFound,
    #[error("attempt not found")]
    AttemptNotFound,
    #[error("question {0} is not part of this test")]
    UnknownQuestion(String),
    #[error("{0}")]
    InvalidAnswer(String),
}

impl SessionError {
    /// Stable machine-readable identifier for clients.
    pub(crate) fn code(&self) -> &'static str {
        match self {
            Self::WindowClosed(_) => "window_closed",
            Self::QuotaExhausted { .. } => "quota_exhausted",
            Self::AttemptNotActive(_) => "attempt_not_active",
            Self::NotEnrolled => "not_enrolled",
            Self::StoreConflict => "store_conflict",
            Self::Unavailable(_) => "unavailable",
            Self::TestNotFound => "test_not_found",
            Self::AttemptNotFound => "attempt_not_found",
            Self::UnknownQuestion(_) => "unknown_question",
            Self::InvalidAnswer(_) => "invalid_answer",
        }
    }

    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreConflict | Self::Unavailable(_))
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Session store operation failed");
        Self::Unavailable(err.to_string())
    }
}
