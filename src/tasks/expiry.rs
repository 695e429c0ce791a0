use anyhow::{Context, Result};

use crate::core::state::AppState;
use crate::repositories::store::OverdueCursor;

/// Upper bound on batches per tick so one tick cannot run unbounded.
const MAX_BATCHES_PER_TICK: usize = 20;

/// Finalizes stored in-progress attempts whose deadline has passed. Safe to
/// run from several workers at once.
pub(crate) async fn close_expired_attempts(state: &AppState) -> Result<usize> {
    let now = state.now();
    let batch_size = state.settings().sessions().sweep_batch_size;
    let batch_limit = i64::try_from(batch_size).unwrap_or(i64::MAX);

    let mut closed = 0;
    let mut failed = 0;
    let mut cursor: Option<OverdueCursor> = None;
    for _ in 0..MAX_BATCHES_PER_TICK {
        let batch = state
            .sessions()
            .close_expired(now, cursor.as_ref(), batch_limit)
            .await
            .context("Failed to close expired attempts")?;
        closed += batch.closed;
        failed += batch.failed;
        // A short page means the listing is exhausted for this tick.
        if (batch.listed as u64) < batch_size {
            break;
        }
        cursor = batch.next;
    }

    if failed > 0 {
        tracing::warn!(failed_attempts = failed, "Some expired attempts could not be closed");
    }

    if closed > 0 {
        tracing::info!(closed_attempts = closed, "Closed expired attempts");
    } else {
        tracing::debug!(closed_attempts = 0, "No expired attempts to close");
    }
    metrics::counter!("expired_attempts_closed_total").increment(closed as u64);

    Ok(closed)
}
