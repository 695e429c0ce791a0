use serde::Serialize;

use crate::core::time::Timestamp;
use crate::db::models::{Test, TestSchedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum WindowState {
    NotYetOpen,
    Open,
    Closed,
}

/// Whether `test` can be started at `now`. Both bounds are inclusive so a
/// start at the very last second is still admitted.
pub(crate) fn window_state(test: &Test, now: Timestamp) -> WindowState {
    let (opens, closes) = window_bounds(test);
    if now < opens {
        WindowState::NotYetOpen
    } else if now <= closes {
        WindowState::Open
    } else {
        WindowState::Closed
    }
}

pub(crate) fn window_bounds(test: &Test) -> (Timestamp, Timestamp) {
    match test.schedule {
        TestSchedule::Live { join_time, end_time } => (join_time, end_time),
        TestSchedule::Flexible { opens_at, closes_at, .. } => (opens_at, closes_at),
    }
}

/// Completed attempts a student may accumulate. Live tests allow exactly one.
pub(crate) fn attempt_quota(test: &Test) -> u32 {
    match test.schedule {
        TestSchedule::Live { .. } => 1,
        TestSchedule::Flexible { attempts_allowed, .. } => attempts_allowed.max(1),
    }
}

/// Deadline for an attempt started at `started_at`. Live attempts never run
/// past the shared end time, even when that cuts the nominal duration short.
pub(crate) fn attempt_deadline(test: &Test, started_at: Timestamp) -> Timestamp {
    let nominal = started_at.plus_seconds(test.total_time_seconds);
    match test.schedule {
        TestSchedule::Live { end_time, .. } => nominal.min(end_time),
        TestSchedule::Flexible { .. } => nominal,
    }
}
