use std::sync::Arc;

use crate::core::time::{Clock, Timestamp};
use crate::core::{config::Settings, redis::RedisHandle};
use crate::repositories::store::EnrollmentDirectory;
use crate::repositories::Stores;
use crate::services::answer_journal::AnswerJournal;
use crate::services::scoring::Scorer;
use crate::services::sessions::SessionManager;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    redis: RedisHandle,
    clock: Arc<dyn Clock>,
    sessions: SessionManager,
    enrollments: Arc<dyn EnrollmentDirectory>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        redis: RedisHandle,
        stores: Stores,
        clock: Arc<dyn Clock>,
        scorer: Arc<dyn Scorer>,
    ) -> Self {
        let journal =
            AnswerJournal::new(stores.answers, settings.sessions().max_text_answer_chars);
        let sessions = SessionManager::new(stores.tests, stores.attempts, journal, scorer);

        Self {
            inner: Arc::new(InnerState {
                settings,
                redis,
                clock,
                sessions,
                enrollments: stores.enrollments,
            }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    /// Server time. The only time source for session decisions.
    pub(crate) fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    pub(crate) fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    pub(crate) fn enrollments(&self) -> &dyn EnrollmentDirectory {
        self.inner.enrollments.as_ref()
    }
}
