use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("attempts_started_total", "Attempts created by start-or-resume");
    metrics::describe_counter!("attempts_resumed_total", "Start calls that resumed an attempt");
    metrics::describe_counter!("attempts_finalized_total", "Attempts moved to a final status");
    metrics::describe_counter!("attempt_start_denied_total", "Start calls denied, by reason");
    metrics::describe_counter!("answers_recorded_total", "Answer writes applied");
    metrics::describe_counter!("expired_attempts_closed_total", "Attempts closed by the sweep");
    metrics::describe_counter!("scoring_failures_total", "Scorer calls that returned an error");
}
