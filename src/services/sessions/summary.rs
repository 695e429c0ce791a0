use crate::core::time::Timestamp;
use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;
use crate::services::classifier::{classify, remaining_seconds, EffectiveStatus};

use super::{SessionError, SessionManager};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AttemptSummary {
    pub(crate) attempt_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) effective_status: EffectiveStatus,
    pub(crate) started_at: Timestamp,
    pub(crate) end_time: Timestamp,
    pub(crate) submitted_at: Option<Timestamp>,
    pub(crate) remaining_seconds: i64,
    pub(crate) score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AttemptHistory {
    pub(crate) attempts: Vec<AttemptSummary>,
    pub(crate) best_score: Option<f64>,
    pub(crate) latest_status: Option<EffectiveStatus>,
}

pub(super) fn summarize(attempts: &[Attempt], now: Timestamp) -> AttemptHistory {
    let mut summaries: Vec<AttemptSummary> = attempts
        .iter()
        .map(|attempt| AttemptSummary {
            attempt_id: attempt.id.clone(),
            attempt_number: attempt.attempt_number,
            status: attempt.status,
            effective_status: classify(attempt, now),
            started_at: attempt.started_at,
            end_time: attempt.end_time,
            submitted_at: attempt.submitted_at,
            remaining_seconds: remaining_seconds(attempt, now),
            score: attempt.score,
        })
        .collect();
    summaries.sort_by_key(|summary| summary.attempt_number);

    let best_score = summaries
        .iter()
        .filter_map(|summary| summary.score)
        .fold(None, |best: Option<f64>, score| Some(best.map_or(score, |best| best.max(score))));
    let latest_status = summaries.last().map(|summary| summary.effective_status);

    AttemptHistory { attempts: summaries, best_score, latest_status }
}

impl SessionManager {
    pub(crate) async fn list_attempt_summaries(
        &self,
        test_id: &str,
        student_id: &str,
        now: Timestamp,
    ) -> Result<AttemptHistory, SessionError> {
        self.get_test(test_id).await?;
        let attempts = self.attempts.list_for_pair(test_id, student_id).await?;
        Ok(summarize(&attempts, now))
    }
}
