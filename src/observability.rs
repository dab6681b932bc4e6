use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservations successfully created.
pub const RESERVATIONS_CREATED_TOTAL: &str = "salas_reservations_created_total";

/// Counter: create/edit attempts rejected for overlapping an active
/// reservation (both the pre-check and the store backstop).
pub const CONFLICTS_REJECTED_TOTAL: &str = "salas_conflicts_rejected_total";

// ── Ticker metrics ──────────────────────────────────────────────

/// Counter: time-triggered status transitions applied. Label: to.
pub const TRANSITIONS_TOTAL: &str = "salas_transitions_total";

/// Counter: per-reservation failures during a tick (retried next tick).
pub const TICK_ITEM_FAILURES_TOTAL: &str = "salas_tick_item_failures_total";

/// Histogram: duration of one full tick in seconds.
pub const TICK_DURATION_SECONDS: &str = "salas_tick_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
