use serde::Serialize;

use crate::core::time::Timestamp;
use crate::db::models::Attempt;

/// Time-aware status of an attempt. Computed on every read; an attempt can
/// become expired without any write happening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum EffectiveStatus {
    Active,
    Completed,
    Expired,
}

/// The single place that decides whether an attempt is still running. Every
/// start, resume, answer, submit and listing path goes through here.
pub(crate) fn classify(attempt: &Attempt, now: Timestamp) -> EffectiveStatus {
    if attempt.status.is_final() {
        EffectiveStatus::Completed
    } else if now > attempt.end_time {
        EffectiveStatus::Expired
    } else {
        EffectiveStatus::Active
    }
}

/// Seconds left on the attempt's own deadline, zero once it has passed.
pub(crate) fn remaining_seconds(attempt: &Attempt, now: Timestamp) -> i64 {
    now.seconds_until(attempt.end_time)
}
