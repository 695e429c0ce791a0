use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::test_support::{self, FLEXIBLE_TEST_ID, LIVE_TEST_ID, OUTSIDER};

fn session_uri(test_id: &str) -> String {
    format!("/api/v1/tests/{test_id}/session")
}

fn answer_body(content: &str, revision: i64) -> serde_json::Value {
    json!({
        "answer": {"kind": "text", "content": content},
        "time_spent_delta_seconds": 30,
        "revision": revision,
    })
}

async fn start(ctx: &test_support::TestContext, student: &str, test_id: &str) -> serde_json::Value {
    let token = ctx.token(student);
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &session_uri(test_id),
            Some(&token),
            None,
        ))
        .await
        .expect("start");
    assert!(response.status().is_success(), "start failed: {}", response.status());
    test_support::read_json(response).await
}

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let ctx = test_support::setup_memory_context().await;

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &session_uri(FLEXIBLE_TEST_ID),
            None,
            None,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["www-authenticate"], "Bearer");
}

#[tokio::test]
async fn students_outside_the_class_are_forbidden() {
    let ctx = test_support::setup_memory_context().await;
    let token = ctx.token(OUTSIDER);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::POST,
            &session_uri(FLEXIBLE_TEST_ID),
            Some(&token),
            None,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = test_support::read_json(response).await;
    assert_eq!(json["code"], "not_enrolled");
    assert_eq!(ctx.store.attempt_count().await, 0);
}

#[tokio::test]
async fn start_creates_then_resumes_with_saved_answers() {
    let ctx = test_support::setup_memory_context().await;
    let token = ctx.token("student-1");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &session_uri(FLEXIBLE_TEST_ID),
            Some(&token),
            None,
        ))
        .await
        .expect("start");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = test_support::read_json(response).await;
    assert_eq!(created["outcome"], "created");
    assert_eq!(created["remaining_seconds"], 1800);
    assert_eq!(created["attempt"]["attempt_number"], 1);
    assert_eq!(created["attempt"]["effective_status"], "active");
    let attempt_id = created["attempt"]["id"].as_str().expect("id").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/attempts/{attempt_id}/answers/q1"),
            Some(&token),
            Some(answer_body("2 mol", 1)),
        ))
        .await
        .expect("answer");
    assert_eq!(response.status(), StatusCode::OK);

    ctx.clock.advance(300);
    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::POST,
            &session_uri(FLEXIBLE_TEST_ID),
            Some(&token),
            None,
        ))
        .await
        .expect("resume");
    assert_eq!(response.status(), StatusCode::OK);
    let resumed = test_support::read_json(response).await;
    assert_eq!(resumed["outcome"], "resumed");
    assert_eq!(resumed["attempt"]["id"], attempt_id.as_str());
    assert_eq!(resumed["remaining_seconds"], 1500);
    assert_eq!(resumed["answers"][0]["question_id"], "q1");
    assert_eq!(resumed["answers"][0]["answer"]["content"], "2 mol");
    assert_eq!(ctx.store.attempt_count().await, 1);
}

#[tokio::test]
async fn session_state_reflects_active_attempt() {
    let ctx = test_support::setup_memory_context().await;
    let token = ctx.token("student-1");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &session_uri(FLEXIBLE_TEST_ID),
            Some(&token),
            None,
        ))
        .await
        .expect("state");
    assert_eq!(response.status(), StatusCode::OK);
    let before = test_support::read_json(response).await;
    assert_eq!(before["window"], "open");
    assert_eq!(before["mode"], "flexible");
    assert_eq!(before["attempts_used"], 0);
    assert_eq!(before["attempts_remaining"], 2);
    assert_eq!(before["can_start_new"], true);
    assert!(before["active_attempt"].is_null());
    assert_eq!(ctx.store.attempt_count().await, 0);

    start(&ctx, "student-1", FLEXIBLE_TEST_ID).await;
    ctx.clock.advance(60);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &session_uri(FLEXIBLE_TEST_ID),
            Some(&token),
            None,
        ))
        .await
        .expect("state");
    let after = test_support::read_json(response).await;
    assert_eq!(after["can_resume"], true);
    assert_eq!(after["can_start_new"], false);
    assert_eq!(after["active_attempt"]["remaining_seconds"], 1740);
}

#[tokio::test]
async fn replayed_answer_is_not_applied_twice() {
    let ctx = test_support::setup_memory_context().await;
    let token = ctx.token("student-1");
    let created = start(&ctx, "student-1", FLEXIBLE_TEST_ID).await;
    let attempt_id = created["attempt"]["id"].as_str().expect("id");
    let uri = format!("/api/v1/attempts/{attempt_id}/answers/q2");

    let first = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &uri,
            Some(&token),
            Some(answer_body("exothermic", 1)),
        ))
        .await
        .expect("answer");
    let first = test_support::read_json(first).await;
    assert_eq!(first["applied"], true);
    assert_eq!(first["time_spent_seconds"], 30);

    let replay = ctx
        .app
        .oneshot(test_support::json_request(
            Method::PUT,
            &uri,
            Some(&token),
            Some(answer_body("exothermic", 1)),
        ))
        .await
        .expect("answer");
    assert_eq!(replay.status(), StatusCode::OK);
    let replay = test_support::read_json(replay).await;
    assert_eq!(replay["applied"], false);
    assert_eq!(replay["time_spent_seconds"], 30);
}

#[tokio::test]
async fn answer_for_unknown_question_is_rejected() {
    let ctx = test_support::setup_memory_context().await;
    let token = ctx.token("student-1");
    let created = start(&ctx, "student-1", FLEXIBLE_TEST_ID).await;
    let attempt_id = created["attempt"]["id"].as_str().expect("id");

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/attempts/{attempt_id}/answers/q99"),
            Some(&token),
            Some(answer_body("?", 1)),
        ))
        .await
        .expect("answer");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = test_support::read_json(response).await;
    assert_eq!(json["code"], "unknown_question");
}

#[tokio::test]
async fn invalid_revision_is_a_bad_request() {
    let ctx = test_support::setup_memory_context().await;
    let token = ctx.token("student-1");
    let created = start(&ctx, "student-1", FLEXIBLE_TEST_ID).await;
    let attempt_id = created["attempt"]["id"].as_str().expect("id");

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/attempts/{attempt_id}/answers/q1"),
            Some(&token),
            Some(answer_body("x", 0)),
        ))
        .await
        .expect("answer");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_is_idempotent_and_closes_the_attempt() {
    let ctx = test_support::setup_memory_context().await;
    let token = ctx.token("student-1");
    let created = start(&ctx, "student-1", FLEXIBLE_TEST_ID).await;
    let attempt_id = created["attempt"]["id"].as_str().expect("id");
    let submit_uri = format!("/api/v1/attempts/{attempt_id}/submit");

    ctx.clock.advance(600);
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::POST, &submit_uri, Some(&token), None))
        .await
        .expect("submit");
    assert_eq!(response.status(), StatusCode::OK);
    let first = test_support::read_json(response).await;
    assert_eq!(first["attempt"]["status"], "submitted");
    assert_eq!(first["already_finalized"], false);

    ctx.clock.advance(10);
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::POST, &submit_uri, Some(&token), None))
        .await
        .expect("submit");
    assert_eq!(response.status(), StatusCode::OK);
    let second = test_support::read_json(response).await;
    assert_eq!(second["already_finalized"], true);
    assert_eq!(second["attempt"]["submitted_at"], first["attempt"]["submitted_at"]);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/attempts/{attempt_id}/answers/q1"),
            Some(&token),
            Some(answer_body("too late", 1)),
        ))
        .await
        .expect("answer");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = test_support::read_json(response).await;
    assert_eq!(json["code"], "attempt_not_active");
}

#[tokio::test]
async fn answers_after_deadline_are_rejected_without_sweep() {
    let ctx = test_support::setup_memory_context().await;
    let token = ctx.token("student-1");
    let created = start(&ctx, "student-1", FLEXIBLE_TEST_ID).await;
    let attempt_id = created["attempt"]["id"].as_str().expect("id");

    ctx.clock.advance(1801);
    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/attempts/{attempt_id}/answers/q1"),
            Some(&token),
            Some(answer_body("late", 1)),
        ))
        .await
        .expect("answer");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = test_support::read_json(response).await;
    assert_eq!(json["code"], "attempt_not_active");
}

#[tokio::test]
async fn another_students_attempt_is_forbidden() {
    let ctx = test_support::setup_memory_context().await;
    let created = start(&ctx, "student-1", FLEXIBLE_TEST_ID).await;
    let attempt_id = created["attempt"]["id"].as_str().expect("id");
    let intruder = ctx.token("student-2");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/attempts/{attempt_id}"),
            Some(&intruder),
            None,
        ))
        .await
        .expect("detail");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/attempts/{attempt_id}/submit"),
            Some(&intruder),
            None,
        ))
        .await
        .expect("submit");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_attempt_is_not_found() {
    let ctx = test_support::setup_memory_context().await;
    let token = ctx.token("student-1");

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/attempts/does-not-exist",
            Some(&token),
            None,
        ))
        .await
        .expect("detail");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn quota_is_enforced_and_history_is_listed() {
    let ctx = test_support::setup_memory_context().await;
    let token = ctx.token("student-1");

    for _ in 0..2 {
        let created = start(&ctx, "student-1", FLEXIBLE_TEST_ID).await;
        let attempt_id = created["attempt"]["id"].as_str().expect("id");
        ctx.clock.advance(60);
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/attempts/{attempt_id}/submit"),
                Some(&token),
                None,
            ))
            .await
            .expect("submit");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &session_uri(FLEXIBLE_TEST_ID),
            Some(&token),
            None,
        ))
        .await
        .expect("start");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = test_support::read_json(response).await;
    assert_eq!(json["code"], "quota_exhausted");
    assert_eq!(ctx.store.attempt_count().await, 2);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/tests/{FLEXIBLE_TEST_ID}/attempts"),
            Some(&token),
            None,
        ))
        .await
        .expect("history");
    assert_eq!(response.status(), StatusCode::OK);
    let history = test_support::read_json(response).await;
    assert_eq!(history["attempt_count"], 2);
    assert_eq!(history["attempts"][0]["attempt_number"], 1);
    assert_eq!(history["attempts"][1]["attempt_number"], 2);
    assert_eq!(history["latest_status"], "completed");
}

#[tokio::test]
async fn live_test_after_end_is_closed() {
    let ctx = test_support::setup_memory_context().await;
    let token = ctx.token("student-1");
    ctx.clock.advance(2401);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::POST,
            &session_uri(LIVE_TEST_ID),
            Some(&token),
            None,
        ))
        .await
        .expect("start");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = test_support::read_json(response).await;
    assert_eq!(json["code"], "window_closed");
}

#[tokio::test]
async fn live_attempt_is_capped_at_test_end() {
    let ctx = test_support::setup_memory_context().await;
    ctx.clock.advance(1200);

    let created = start(&ctx, "student-2", LIVE_TEST_ID).await;
    assert_eq!(created["remaining_seconds"], 1200);
}
