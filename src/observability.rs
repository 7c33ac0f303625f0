use std::net::SocketAddr;

use crate::model::BookingStatus;

// ── Request-driven ──────────────────────────────────────────────

/// Counter: bookings accepted by `create`.
pub const BOOKINGS_CREATED_TOTAL: &str = "parkd_bookings_created_total";

/// Counter: requests rejected because the spot was taken. Labels: operation.
pub const OVERLAP_CONFLICTS_TOTAL: &str = "parkd_overlap_conflicts_total";

/// Counter: status changes applied. Labels: to, source.
pub const TRANSITIONS_TOTAL: &str = "parkd_transitions_total";

/// Counter: payment callbacks ignored because the booking was unknown or had moved on.
pub const PAYMENT_CALLBACKS_IGNORED_TOTAL: &str = "parkd_payment_callbacks_ignored_total";

// ── Reconciler ──────────────────────────────────────────────────

/// Histogram: wall time of one reconcile run in seconds.
pub const RECONCILE_PASS_DURATION_SECONDS: &str = "parkd_reconcile_pass_duration_seconds";

/// Counter: items a reconcile pass could not advance. Labels: pass.
pub const RECONCILE_FAILURES_TOTAL: &str = "parkd_reconcile_failures_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "parkd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "parkd_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Count one applied status change.
pub fn record_transition(to: BookingStatus, source: &'static str) {
    metrics::counter!(TRANSITIONS_TOTAL, "to" => to.as_str(), "source" => source).increment(1);
}
