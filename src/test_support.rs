use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::security::{self, Claims};
use crate::core::time::{ManualClock, Timestamp};
use crate::core::{config::Settings, redis::RedisHandle, state::AppState};
use crate::db::models::{Attempt, QuestionRef, Test, TestSchedule};
use crate::db::types::AttemptStatus;
use crate::repositories::memory::MemoryStore;
use crate::repositories::pg_store::PgStore;
use crate::repositories::store::{
    AttemptStore, CreateOutcome, NewAttempt, OverdueCursor, StoreError,
};
use crate::repositories::Stores;
use crate::services::scoring::NoopScorer;

const TEST_SECRET_KEY: &str = "test-secret";
const TEST_REDIS_DB: &str = "1";

pub(crate) const CLOCK_START: i64 = 1_700_000_000;
pub(crate) const CLASS_ID: &str = "class-chem-101";
pub(crate) const FLEXIBLE_TEST_ID: &str = "test-flexible";
pub(crate) const LIVE_TEST_ID: &str = "test-live";
pub(crate) const ENROLLED_STUDENTS: [&str; 3] = ["student-1", "student-2", "student-3"];
pub(crate) const OUTSIDER: &str = "student-outsider";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) store: MemoryStore,
    pub(crate) clock: Arc<ManualClock>,
    _guard: OwnedMutexGuard<()>,
}

impl TestContext {
    pub(crate) fn now(&self) -> Timestamp {
        self.state.now()
    }

    pub(crate) fn token(&self, student_id: &str) -> String {
        bearer_token(student_id, self.state.settings())
    }
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("EXAMHALL_ENV", "test");
    std::env::set_var("EXAMHALL_STRICT_CONFIG", "0");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::remove_var("EXAMHALL_SECRET_FILE");
    std::env::set_var("PERSISTENCE_BACKEND", "memory");
    std::env::remove_var("MEMORY_SEED_PATH");
    std::env::set_var("REDIS_HOST", "127.0.0.1");
    std::env::set_var("REDIS_PORT", "6379");
    std::env::set_var("REDIS_DB", TEST_REDIS_DB);
    std::env::remove_var("REDIS_PASSWORD");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("SWEEP_BATCH_SIZE");
    std::env::remove_var("SCORING_WEBHOOK_URL");
    std::env::remove_var("SCORING_WEBHOOK_TOKEN");
    std::env::remove_var("ANSWER_RATE_LIMIT_PER_MINUTE");
    std::env::remove_var("MAX_TEXT_ANSWER_CHARS");
    std::env::remove_var("PROJECT_NAME");
    std::env::remove_var("API_V1_STR");
}

pub(crate) async fn setup_memory_context() -> TestContext {
    setup_memory_context_with(|| {}).await
}

/// Same as [`setup_memory_context`], with a hook to tweak the environment
/// before settings are loaded.
pub(crate) async fn setup_memory_context_with(configure: impl FnOnce()) -> TestContext {
    setup_context(configure, Stores::single).await
}

/// Seeded memory store behind whatever store wiring `stores` builds from it.
pub(crate) async fn setup_context(
    configure: impl FnOnce(),
    stores: impl FnOnce(MemoryStore) -> Stores,
) -> TestContext {
    let guard = env_lock().await;
    set_test_env();
    configure();

    let settings = Settings::load().expect("settings");
    let store = MemoryStore::new();
    seed(&store).await;

    let clock = Arc::new(ManualClock::new(Timestamp::from_unix(CLOCK_START)));
    // Never connected: rate limiting falls open.
    let redis = RedisHandle::new(settings.redis().redis_url());

    let state = AppState::new(
        settings,
        redis,
        stores(store.clone()),
        clock.clone(),
        Arc::new(NoopScorer),
    );
    let app = api::router::router(state.clone());

    TestContext { state, app, store, clock, _guard: guard }
}

pub(crate) struct PgTestContext {
    pub(crate) store: PgStore,
    pub(crate) pool: PgPool,
    _guard: OwnedMutexGuard<()>,
}

fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty())
}

/// Migrated, emptied Postgres store seeded with one flexible test in
/// [`CLASS_ID`]. `None` when `DATABASE_URL` is not set.
pub(crate) async fn setup_pg_context() -> Option<PgTestContext> {
    let Some(database_url) = database_url() else {
        eprintln!("DATABASE_URL is not set; skipping Postgres store test");
        return None;
    };

    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let guard = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone().lock_owned().await;

    let pool =
        PgPoolOptions::new().max_connections(4).connect(&database_url).await.expect("connect");
    crate::db::run_migrations(&pool).await.expect("migrations");
    sqlx::query("TRUNCATE answers, attempts, test_questions, tests, class_memberships CASCADE")
        .execute(&pool)
        .await
        .expect("truncate");

    let at = |offset: i64| Timestamp::from_unix(CLOCK_START + offset).to_primitive();
    sqlx::query(
        "INSERT INTO tests (
            id, class_id, title, mode, total_time_seconds, opens_at, closes_at,
            attempts_allowed, created_at, updated_at
        ) VALUES ($1, $2, 'Stoichiometry practice', 'flexible', 1800, $3, $4, 2, $3, $3)",
    )
    .bind(FLEXIBLE_TEST_ID)
    .bind(CLASS_ID)
    .bind(at(-3600))
    .bind(at(3600))
    .execute(&pool)
    .await
    .expect("insert test");
    for (position, question_id) in ["q1", "q2", "q3"].into_iter().enumerate() {
        sqlx::query(
            "INSERT INTO test_questions (test_id, question_id, position) VALUES ($1, $2, $3)",
        )
        .bind(FLEXIBLE_TEST_ID)
        .bind(question_id)
        .bind(position as i32)
        .execute(&pool)
        .await
        .expect("insert question");
    }
    for student in ENROLLED_STUDENTS {
        sqlx::query("INSERT INTO class_memberships (class_id, student_id) VALUES ($1, $2)")
            .bind(CLASS_ID)
            .bind(student)
            .execute(&pool)
            .await
            .expect("insert membership");
    }

    Some(PgTestContext { store: PgStore::new(pool.clone()), pool, _guard: guard })
}

async fn seed(store: &MemoryStore) {
    let at = |offset: i64| Timestamp::from_unix(CLOCK_START + offset);
    let questions: Vec<QuestionRef> = ["q1", "q2", "q3"]
        .into_iter()
        .map(|id| QuestionRef { question_id: id.to_string(), points: 1.0 })
        .collect();

    store
        .insert_test(Test {
            id: FLEXIBLE_TEST_ID.to_string(),
            class_id: CLASS_ID.to_string(),
            title: "Stoichiometry practice".to_string(),
            total_time_seconds: 1800,
            schedule: TestSchedule::Flexible {
                opens_at: at(-3600),
                closes_at: at(3600),
                attempts_allowed: 2,
            },
            questions: questions.clone(),
        })
        .await;
    store
        .insert_test(Test {
            id: LIVE_TEST_ID.to_string(),
            class_id: CLASS_ID.to_string(),
            title: "Midterm".to_string(),
            total_time_seconds: 3600,
            schedule: TestSchedule::Live { join_time: at(-600), end_time: at(2400) },
            questions,
        })
        .await;

    for student in ENROLLED_STUDENTS {
        store.enroll(CLASS_ID, student).await;
    }
}

/// Memory store for everything except attempts, which go through `attempts`.
pub(crate) fn stores_with_attempts(
    store: MemoryStore,
    attempts: impl AttemptStore + 'static,
) -> Stores {
    Stores { attempts: Arc::new(attempts), ..Stores::single(store) }
}

/// Attempt store over a [`MemoryStore`] that fails selected operations.
pub(crate) struct ScriptedAttempts {
    inner: MemoryStore,
    conflict_on_create: bool,
    failing_student: Option<String>,
}

impl ScriptedAttempts {
    /// Every conditional create loses the race and nothing is inserted.
    pub(crate) fn always_conflicting(inner: MemoryStore) -> Self {
        Self { inner, conflict_on_create: true, failing_student: None }
    }

    /// Completing any attempt owned by `student_id` fails as unavailable.
    pub(crate) fn failing_completion_for(inner: MemoryStore, student_id: &str) -> Self {
        Self { inner, conflict_on_create: false, failing_student: Some(student_id.to_string()) }
    }
}

#[async_trait]
impl AttemptStore for ScriptedAttempts {
    async fn create_in_progress(&self, attempt: NewAttempt) -> Result<CreateOutcome, StoreError> {
        if self.conflict_on_create {
            return Ok(CreateOutcome::Conflict);
        }
        self.inner.create_in_progress(attempt).await
    }

    async fn find(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError> {
        self.inner.find(attempt_id).await
    }

    async fn list_for_pair(
        &self,
        test_id: &str,
        student_id: &str,
    ) -> Result<Vec<Attempt>, StoreError> {
        self.inner.list_for_pair(test_id, student_id).await
    }

    async fn complete(
        &self,
        attempt_id: &str,
        status: AttemptStatus,
        submitted_at: Timestamp,
    ) -> Result<Option<Attempt>, StoreError> {
        if let Some(student) = &self.failing_student {
            let owner = self.inner.find(attempt_id).await?.map(|attempt| attempt.student_id);
            if owner.as_deref() == Some(student.as_str()) {
                return Err(StoreError::Unavailable("write rejected".to_string()));
            }
        }
        self.inner.complete(attempt_id, status, submitted_at).await
    }

    async fn record_score(
        &self,
        attempt_id: &str,
        score: f64,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        self.inner.record_score(attempt_id, score, now).await
    }

    async fn list_overdue(
        &self,
        now: Timestamp,
        after: Option<&OverdueCursor>,
        limit: i64,
    ) -> Result<Vec<Attempt>, StoreError> {
        self.inner.list_overdue(now, after, limit).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Signs a token the way the identity service does: HMAC over `sub`/`exp`.
pub(crate) fn mint_token(student_id: &str, settings: &Settings, expires_in: Duration) -> String {
    let algorithm = security::algorithm_from_settings(settings).expect("algorithm");
    let claims = Claims {
        sub: student_id.to_string(),
        exp: (OffsetDateTime::now_utc() + expires_in).unix_timestamp(),
    };
    encode(
        &Header::new(algorithm),
        &claims,
        &EncodingKey::from_secret(settings.security().secret_key.as_bytes()),
    )
    .expect("token")
}

pub(crate) fn bearer_token(student_id: &str, settings: &Settings) -> String {
    mint_token(student_id, settings, Duration::hours(1))
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
