pub(crate) mod answers;
pub(crate) mod attempts;
pub(crate) mod enrollments;
pub(crate) mod health;
pub(crate) mod memory;
pub(crate) mod pg_store;
pub(crate) mod store;
pub(crate) mod test_definitions;

use std::sync::Arc;

use crate::repositories::store::{AnswerStore, AttemptStore, EnrollmentDirectory, TestCatalog};

/// The four store contracts, shared by the API and the sweep worker.
#[derive(Clone)]
pub(crate) struct Stores {
    pub(crate) tests: Arc<dyn TestCatalog>,
    pub(crate) enrollments: Arc<dyn EnrollmentDirectory>,
    pub(crate) attempts: Arc<dyn AttemptStore>,
    pub(crate) answers: Arc<dyn AnswerStore>,
}

impl Stores {
    /// One backend serving every contract.
    pub(crate) fn single<S>(store: S) -> Self
    where
        S: TestCatalog + EnrollmentDirectory + AttemptStore + AnswerStore + Clone + 'static,
    {
        Self {
            tests: Arc::new(store.clone()),
            enrollments: Arc::new(store.clone()),
            attempts: Arc::new(store.clone()),
            answers: Arc::new(store),
        }
    }
}
