use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::Mutex;

use crate::core::time::Timestamp;
use crate::db::models::{Answer, Attempt, QuestionRef, Test, TestSchedule};
use crate::db::types::{AttemptStatus, TestMode};
use crate::repositories::store::{
    AnswerStore, AnswerWrite, AttemptStore, CreateOutcome, EnrollmentDirectory, NewAttempt,
    OverdueCursor, StoreError, TestCatalog, UpsertOutcome,
};

/// Process-local store with the same conditional-write semantics as the
/// Postgres one. Every operation runs under one lock, so check-then-insert is
/// atomic.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    tests: HashMap<String, Test>,
    memberships: HashSet<(String, String)>,
    attempts: HashMap<String, Attempt>,
    answers: HashMap<(String, String), Answer>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a test definition.
    pub(crate) async fn insert_test(&self, test: Test) {
        let mut inner = self.inner.lock().await;
        inner.tests.insert(test.id.clone(), test);
    }

    pub(crate) async fn enroll(&self, class_id: &str, student_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.memberships.insert((class_id.to_string(), student_id.to_string()));
    }

    pub(crate) async fn attempt_count(&self) -> usize {
        self.inner.lock().await.attempts.len()
    }

    /// Loads tests and class memberships from a JSON seed file.
    pub(crate) async fn seed_from_file(&self, path: &Path) -> anyhow::Result<()> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        let seed: SeedFile = serde_json::from_str(&raw).context("Failed to parse seed file")?;

        let tests = seed.tests.len();
        for test in seed.tests {
            self.insert_test(test.into_test()?).await;
        }
        for membership in &seed.memberships {
            self.enroll(&membership.class_id, &membership.student_id).await;
        }

        tracing::info!(
            path = %path.display(),
            tests,
            memberships = seed.memberships.len(),
            "Seeded in-memory store"
        );
        Ok(())
    }
}

#[async_trait]
impl TestCatalog for MemoryStore {
    async fn get_test(&self, test_id: &str) -> Result<Option<Test>, StoreError> {
        Ok(self.inner.lock().await.tests.get(test_id).cloned())
    }
}

#[async_trait]
impl EnrollmentDirectory for MemoryStore {
    async fn is_enrolled(&self, student_id: &str, test_id: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().await;
        let Some(test) = inner.tests.get(test_id) else {
            return Ok(false);
        };
        Ok(inner.memberships.contains(&(test.class_id.clone(), student_id.to_string())))
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn create_in_progress(&self, attempt: NewAttempt) -> Result<CreateOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let clashes = inner.attempts.values().any(|existing| {
            existing.test_id == attempt.test_id
                && existing.student_id == attempt.student_id
                && (existing.status == AttemptStatus::InProgress
                    || existing.attempt_number == attempt.attempt_number)
        });
        if clashes || inner.attempts.contains_key(&attempt.id) {
            return Ok(CreateOutcome::Conflict);
        }

        let created = Attempt {
            id: attempt.id,
            test_id: attempt.test_id,
            student_id: attempt.student_id,
            attempt_number: attempt.attempt_number,
            status: AttemptStatus::InProgress,
            started_at: attempt.started_at,
            total_time_allowed_seconds: attempt.total_time_allowed_seconds,
            end_time: attempt.end_time,
            submitted_at: None,
            score: None,
        };
        inner.attempts.insert(created.id.clone(), created.clone());
        Ok(CreateOutcome::Created(created))
    }

    async fn find(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError> {
        Ok(self.inner.lock().await.attempts.get(attempt_id).cloned())
    }

    async fn list_for_pair(
        &self,
        test_id: &str,
        student_id: &str,
    ) -> Result<Vec<Attempt>, StoreError> {
        let inner = self.inner.lock().await;
        let mut attempts: Vec<Attempt> = inner
            .attempts
            .values()
            .filter(|attempt| attempt.test_id == test_id && attempt.student_id == student_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|attempt| attempt.attempt_number);
        Ok(attempts)
    }

    async fn complete(
        &self,
        attempt_id: &str,
        status: AttemptStatus,
        submitted_at: Timestamp,
    ) -> Result<Option<Attempt>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(attempt) = inner.attempts.get_mut(attempt_id) else {
            return Ok(None);
        };
        if attempt.status != AttemptStatus::InProgress {
            return Ok(None);
        }
        attempt.status = status;
        attempt.submitted_at = Some(submitted_at);
        Ok(Some(attempt.clone()))
    }

    async fn record_score(
        &self,
        attempt_id: &str,
        score: f64,
        _now: Timestamp,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(attempt) = inner.attempts.get_mut(attempt_id) {
            attempt.score = Some(score);
        }
        Ok(())
    }

    async fn list_overdue(
        &self,
        now: Timestamp,
        after: Option<&OverdueCursor>,
        limit: i64,
    ) -> Result<Vec<Attempt>, StoreError> {
        let inner = self.inner.lock().await;
        let mut overdue: Vec<Attempt> = inner
            .attempts
            .values()
            .filter(|attempt| attempt.status == AttemptStatus::InProgress && attempt.end_time < now)
            .filter(|attempt| match after {
                Some(cursor) => {
                    (attempt.end_time, attempt.id.as_str())
                        > (cursor.end_time, cursor.attempt_id.as_str())
                }
                None => true,
            })
            .cloned()
            .collect();
        overdue.sort_by(|a, b| (a.end_time, &a.id).cmp(&(b.end_time, &b.id)));
        overdue.truncate(limit.clamp(1, 10_000) as usize);
        Ok(overdue)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl AnswerStore for MemoryStore {
    async fn upsert(&self, write: AnswerWrite) -> Result<UpsertOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let key = (write.attempt_id.clone(), write.question_id.clone());

        let open = inner.attempts.get(&write.attempt_id).is_some_and(|attempt| {
            attempt.status == AttemptStatus::InProgress && attempt.end_time >= write.now
        });

        if let Some(existing) = inner.answers.get(&key) {
            if existing.revision >= write.revision {
                return Ok(UpsertOutcome::Duplicate(existing.clone()));
            }
        }
        if !open {
            return Ok(UpsertOutcome::AttemptClosed);
        }

        let accumulated = inner
            .answers
            .get(&key)
            .map(|existing| existing.time_spent_seconds)
            .unwrap_or(0)
            .saturating_add(write.delta_time_spent_seconds);
        let answer = Answer {
            attempt_id: write.attempt_id,
            question_id: write.question_id,
            payload: write.payload,
            time_spent_seconds: accumulated,
            revision: write.revision,
            updated_at: write.now,
        };
        inner.answers.insert(key, answer.clone());
        Ok(UpsertOutcome::Applied(answer))
    }

    async fn list_for_attempt(&self, attempt_id: &str) -> Result<Vec<Answer>, StoreError> {
        let inner = self.inner.lock().await;
        let mut answers: Vec<Answer> = inner
            .answers
            .values()
            .filter(|answer| answer.attempt_id == attempt_id)
            .cloned()
            .collect();
        answers.sort_by(|left, right| left.question_id.cmp(&right.question_id));
        Ok(answers)
    }
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    tests: Vec<SeedTest>,
    #[serde(default)]
    memberships: Vec<SeedMembership>,
}

#[derive(Debug, Deserialize)]
struct SeedMembership {
    class_id: String,
    student_id: String,
}

#[derive(Debug, Deserialize)]
struct SeedTest {
    id: String,
    class_id: String,
    title: String,
    mode: TestMode,
    total_time_seconds: i64,
    join_time: Option<String>,
    end_time: Option<String>,
    opens_at: Option<String>,
    closes_at: Option<String>,
    attempts_allowed: Option<u32>,
    #[serde(default)]
    questions: Vec<SeedQuestion>,
}

#[derive(Debug, Deserialize)]
struct SeedQuestion {
    question_id: String,
    #[serde(default = "default_points")]
    points: f64,
}

fn default_points() -> f64 {
    1.0
}

impl SeedTest {
    fn into_test(self) -> anyhow::Result<Test> {
        let id = self.id;
        let parse = |field: &str, value: Option<String>| -> anyhow::Result<Timestamp> {
            let raw = value.ok_or_else(|| anyhow!("test {id}: missing {field}"))?;
            OffsetDateTime::parse(&raw, &Rfc3339)
                .map(Timestamp::from_offset)
                .with_context(|| format!("test {id}: invalid {field} '{raw}'"))
        };

        let schedule = match self.mode {
            TestMode::Live => TestSchedule::Live {
                join_time: parse("join_time", self.join_time)?,
                end_time: parse("end_time", self.end_time)?,
            },
            TestMode::Flexible => TestSchedule::Flexible {
                opens_at: parse("opens_at", self.opens_at)?,
                closes_at: parse("closes_at", self.closes_at)?,
                attempts_allowed: self
                    .attempts_allowed
                    .filter(|value| *value >= 1)
                    .ok_or_else(|| anyhow!("test {id}: attempts_allowed must be at least 1"))?,
            },
        };
        if self.total_time_seconds <= 0 {
            return Err(anyhow!("test {id}: total_time_seconds must be positive"));
        }

        Ok(Test {
            id: id.clone(),
            class_id: self.class_id,
            title: self.title,
            total_time_seconds: self.total_time_seconds,
            schedule,
            questions: self
                .questions
                .into_iter()
                .map(|question| QuestionRef {
                    question_id: question.question_id,
                    points: question.points,
                })
                .collect(),
        })
    }
}
