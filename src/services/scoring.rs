use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::core::config::Settings;
use crate::db::models::{Answer, AnswerPayload, Attempt};

/// Everything a grader receives once an attempt is final.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScoringRequest {
    pub(crate) attempt_id: String,
    pub(crate) test_id: String,
    pub(crate) student_id: String,
    pub(crate) status: &'static str,
    /// Sum of question points; absent when the test could not be loaded.
    pub(crate) max_score: Option<f64>,
    pub(crate) answers: Vec<ScoredAnswer>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScoredAnswer {
    pub(crate) question_id: String,
    pub(crate) response: AnswerPayload,
    pub(crate) time_spent_seconds: i64,
}

impl ScoringRequest {
    pub(crate) fn new(attempt: &Attempt, max_score: Option<f64>, answers: Vec<Answer>) -> Self {
        Self {
            attempt_id: attempt.id.clone(),
            test_id: attempt.test_id.clone(),
            student_id: attempt.student_id.clone(),
            status: attempt.status.as_str(),
            max_score,
            answers: answers
                .into_iter()
                .map(|answer| ScoredAnswer {
                    question_id: answer.question_id,
                    response: answer.payload,
                    time_spent_seconds: answer.time_spent_seconds,
                })
                .collect(),
        }
    }
}

/// External grading hook. `Ok(None)` means the score will arrive later
/// (manual essay review, for instance).
#[async_trait]
pub(crate) trait Scorer: Send + Sync {
    async fn score(&self, request: ScoringRequest) -> Result<Option<f64>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NoopScorer;

#[async_trait]
impl Scorer for NoopScorer {
    async fn score(&self, request: ScoringRequest) -> Result<Option<f64>> {
        tracing::debug!(attempt_id = %request.attempt_id, "No scoring webhook configured");
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct WebhookResponse {
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Clone)]
pub(crate) struct WebhookScorer {
    client: Client,
    url: String,
    token: String,
}

impl WebhookScorer {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(settings.scoring().timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: settings.scoring().webhook_url.clone(),
            token: settings.scoring().webhook_token.clone(),
        })
    }
}

#[async_trait]
impl Scorer for WebhookScorer {
    async fn score(&self, request: ScoringRequest) -> Result<Option<f64>> {
        let timer = Instant::now();
        let attempt_id = request.attempt_id.clone();

        let mut builder = self.client.post(&self.url).json(&request);
        if !self.token.is_empty() {
            builder = builder.bearer_auth(&self.token);
        }

        let response = builder.send().await.context("Scoring webhook request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Scoring webhook returned {status}: {body}");
        }

        let parsed: WebhookResponse =
            response.json().await.context("Scoring webhook returned invalid JSON")?;
        tracing::info!(
            attempt_id = %attempt_id,
            score = ?parsed.score,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "Scoring webhook completed"
        );
        Ok(parsed.score)
    }
}

/// Picks the webhook scorer when a URL is configured.
pub(crate) fn from_settings(settings: &Settings) -> Result<Arc<dyn Scorer>> {
    if settings.scoring().webhook_url.is_empty() {
        return Ok(Arc::new(NoopScorer));
    }
    Ok(Arc::new(WebhookScorer::from_settings(settings)?))
}
