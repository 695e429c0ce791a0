use crate::core::time::Timestamp;
use crate::db::models::{Attempt, Test};
use crate::db::types::TestMode;
use crate::services::availability::{attempt_quota, window_bounds, window_state, WindowState};
use crate::services::classifier::{classify, remaining_seconds, EffectiveStatus};

use super::{SessionError, SessionManager};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ActiveAttempt {
    pub(crate) attempt_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) end_time: Timestamp,
    pub(crate) remaining_seconds: i64,
}

/// What a student sees on the test landing page. Derived, never stored.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SessionState {
    pub(crate) test_id: String,
    pub(crate) student_id: String,
    pub(crate) mode: TestMode,
    pub(crate) window: WindowState,
    pub(crate) opens_at: Timestamp,
    pub(crate) closes_at: Timestamp,
    pub(crate) total_time_seconds: i64,
    pub(crate) attempts_allowed: u32,
    /// Completed plus expired attempts.
    pub(crate) attempts_used: u32,
    pub(crate) active: Option<ActiveAttempt>,
    pub(crate) can_start_new: bool,
    pub(crate) server_time: Timestamp,
}

impl SessionState {
    pub(crate) fn attempts_remaining(&self) -> u32 {
        self.attempts_allowed.saturating_sub(self.attempts_used)
    }

    pub(crate) fn can_resume(&self) -> bool {
        self.active.is_some()
    }
}

pub(super) fn consumed_attempts(attempts: &[Attempt], now: Timestamp) -> u32 {
    let consumed = attempts
        .iter()
        .filter(|attempt| classify(attempt, now) != EffectiveStatus::Active)
        .count();
    u32::try_from(consumed).unwrap_or(u32::MAX)
}

pub(super) fn active_attempt(attempts: &[Attempt], now: Timestamp) -> Option<&Attempt> {
    let mut active =
        attempts.iter().filter(|attempt| classify(attempt, now) == EffectiveStatus::Active);
    let first = active.next()?;
    let newest = active.fold(first, |best, candidate| {
        if candidate.attempt_number > best.attempt_number {
            candidate
        } else {
            best
        }
    });
    if newest.id != first.id {
        tracing::warn!(
            test_id = %first.test_id,
            student_id = %first.student_id,
            "More than one active attempt for the same student and test"
        );
    }
    Some(newest)
}

pub(super) fn evaluate(
    test: &Test,
    student_id: &str,
    attempts: &[Attempt],
    now: Timestamp,
) -> SessionState {
    let window = window_state(test, now);
    let (opens_at, closes_at) = window_bounds(test);
    let attempts_allowed = attempt_quota(test);
    let attempts_used = consumed_attempts(attempts, now);
    let active = active_attempt(attempts, now).map(|attempt| ActiveAttempt {
        attempt_id: attempt.id.clone(),
        attempt_number: attempt.attempt_number,
        end_time: attempt.end_time,
        remaining_seconds: remaining_seconds(attempt, now),
    });
    let can_start_new =
        window == WindowState::Open && active.is_none() && attempts_used < attempts_allowed;

    SessionState {
        test_id: test.id.clone(),
        student_id: student_id.to_string(),
        mode: test.mode(),
        window,
        opens_at,
        closes_at,
        total_time_seconds: test.total_time_seconds,
        attempts_allowed,
        attempts_used,
        active,
        can_start_new,
        server_time: now,
    }
}

impl SessionManager {
    /// Read-only view of the pair's session. Expired attempts are reported
    /// as consumed without being written back.
    pub(crate) async fn get_session_state(
        &self,
        test_id: &str,
        student_id: &str,
        now: Timestamp,
    ) -> Result<SessionState, SessionError> {
        let test = self.get_test(test_id).await?;
        let attempts = self.attempts.list_for_pair(test_id, student_id).await?;
        Ok(evaluate(&test, student_id, &attempts, now))
    }
}
