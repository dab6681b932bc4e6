use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::limits::MAX_TICK_BATCH;
use crate::model::{ReservationStatus, due_transition};
use crate::observability;
use crate::store::StoreError;

/// Statuses the ticker scans. Terminal states never appear here.
pub const SCAN_STATUSES: [ReservationStatus; 3] = [
    ReservationStatus::Scheduled,
    ReservationStatus::InUse,
    ReservationStatus::AwaitingConfirmation,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub scanned: usize,
    pub advanced: usize,
    pub failed: usize,
}

/// One scan-and-advance cycle. `now` is read once so the whole batch sees a
/// consistent snapshot. Per-reservation failures are logged and counted but
/// never abort the batch — the next tick retries them naturally. Transitions
/// are guarded by state equality, so re-running against unchanged rows is a
/// no-op.
pub async fn tick(engine: &Engine) -> TickSummary {
    let now = engine.clock.now();
    let mut batch = match engine.store.list_by_status(&SCAN_STATUSES).await {
        Ok(batch) => batch,
        Err(e) => {
            warn!("tick scan failed: {e}");
            return TickSummary::default();
        }
    };
    if batch.len() > MAX_TICK_BATCH {
        debug!(len = batch.len(), "truncating tick batch");
        batch.truncate(MAX_TICK_BATCH);
    }

    let mut summary = TickSummary::default();
    for reservation in batch {
        summary.scanned += 1;
        let Some(next) = due_transition(
            reservation.status,
            &reservation.window,
            now,
            engine.policy().grace(),
        ) else {
            continue;
        };

        let used_at = (next == ReservationStatus::Used).then_some(now);
        match engine
            .store
            .update_status(reservation.id, reservation.status, next, now, used_at)
            .await
        {
            Ok(_) => {
                info!(id = %reservation.id, from = %reservation.status, to = %next, "advanced");
                metrics::counter!(observability::TRANSITIONS_TOTAL, "to" => next.to_string())
                    .increment(1);
                summary.advanced += 1;
            }
            Err(StoreError::StaleStatus { actual }) => {
                // Someone cancelled or confirmed between scan and write; the
                // snapshot is obsolete, not failed.
                debug!(id = %reservation.id, now = %actual, "status moved under the scan");
            }
            Err(e) => {
                // Retried on the next tick.
                warn!(id = %reservation.id, "tick update failed: {e}");
                metrics::counter!(observability::TICK_ITEM_FAILURES_TOTAL).increment(1);
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Tick period from `SALAS_TICK_SECONDS`, default one minute.
pub fn period_from_env() -> Duration {
    std::env::var("SALAS_TICK_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(60))
}

/// Background loop. Missed ticks are skipped rather than bunched, and each
/// tick is bounded by the period so a slow store cannot make a tick overlap
/// with the next one. Aborting a tick mid-batch is safe: transitions are
/// idempotent and the remainder is picked up next time.
pub async fn run_ticker(engine: Arc<Engine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let start = std::time::Instant::now();
        match tokio::time::timeout(period, tick(&engine)).await {
            Ok(summary) => {
                if summary.advanced > 0 || summary.failed > 0 {
                    info!(
                        scanned = summary.scanned,
                        advanced = summary.advanced,
                        failed = summary.failed,
                        "tick complete"
                    );
                }
            }
            Err(_) => warn!("tick exceeded its period, abandoning remainder"),
        }
        metrics::histogram!(observability::TICK_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
    }
}
