use std::sync::Arc;

use thiserror::Error;

use crate::core::time::Timestamp;
use crate::db::models::{Answer, AnswerPayload};
use crate::repositories::store::{AnswerStore, AnswerWrite, StoreError, UpsertOutcome};

#[derive(Debug, Error)]
pub(crate) enum JournalError {
    #[error("attempt is no longer accepting answers")]
    AttemptClosed,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub(crate) struct JournalEntry {
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) payload: AnswerPayload,
    pub(crate) delta_time_spent_seconds: i64,
    /// Client-side write counter for this question; replays of an already
    /// stored revision are no-ops.
    pub(crate) revision: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JournalOutcome {
    Recorded(Answer),
    Unchanged(Answer),
}

impl JournalOutcome {
    pub(crate) fn answer(&self) -> &Answer {
        match self {
            Self::Recorded(answer) | Self::Unchanged(answer) => answer,
        }
    }

    pub(crate) fn was_applied(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }

    pub(crate) fn into_answer(self) -> Answer {
        match self {
            Self::Recorded(answer) | Self::Unchanged(answer) => answer,
        }
    }
}

/// Per-question answer persistence. Answer content is replaced, time spent
/// is accumulated, and both are keyed by (attempt, question).
#[derive(Clone)]
pub(crate) struct AnswerJournal {
    store: Arc<dyn AnswerStore>,
    max_text_chars: usize,
}

impl AnswerJournal {
    pub(crate) fn new(store: Arc<dyn AnswerStore>, max_text_chars: usize) -> Self {
        Self { store, max_text_chars }
    }

    /// `max_delta_seconds` bounds a single time-spent increment; negative
    /// deltas count as zero.
    pub(crate) async fn upsert(
        &self,
        entry: JournalEntry,
        max_delta_seconds: i64,
        now: Timestamp,
    ) -> Result<JournalOutcome, JournalError> {
        self.validate(&entry)?;

        let write = AnswerWrite {
            attempt_id: entry.attempt_id,
            question_id: entry.question_id,
            payload: entry.payload,
            delta_time_spent_seconds: entry.delta_time_spent_seconds.clamp(0, max_delta_seconds.max(0)),
            revision: entry.revision,
            now,
        };

        match self.store.upsert(write).await? {
            UpsertOutcome::Applied(answer) => Ok(JournalOutcome::Recorded(answer)),
            UpsertOutcome::Duplicate(answer) => Ok(JournalOutcome::Unchanged(answer)),
            UpsertOutcome::AttemptClosed => Err(JournalError::AttemptClosed),
        }
    }

    pub(crate) async fn list(&self, attempt_id: &str) -> Result<Vec<Answer>, JournalError> {
        Ok(self.store.list_for_attempt(attempt_id).await?)
    }

    fn validate(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        if entry.revision < 1 {
            return Err(JournalError::Invalid("revision must be at least 1".to_string()));
        }

        match &entry.payload {
            AnswerPayload::Choice { option_id } if option_id.trim().is_empty() => {
                Err(JournalError::Invalid("option_id must not be empty".to_string()))
            }
            AnswerPayload::Text { content } if content.chars().count() > self.max_text_chars => {
                Err(JournalError::Invalid(format!(
                    "Text answers are limited to {} characters",
                    self.max_text_chars
                )))
            }
            _ => Ok(()),
        }
    }
}
