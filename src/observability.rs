use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings created (PENDING inserted).
pub const BOOKINGS_CREATED_TOTAL: &str = "bookable_bookings_created_total";

/// Counter: booking or blocked-period requests rejected for date conflicts.
pub const CONFLICTS_REJECTED_TOTAL: &str = "bookable_conflicts_rejected_total";

/// Counter: payment confirmations applied (PENDING → CONFIRMED).
pub const PAYMENTS_CONFIRMED_TOTAL: &str = "bookable_payments_confirmed_total";

/// Counter: refund-required outcomes from the confirm-time re-check.
pub const REFUNDS_REQUIRED_TOTAL: &str = "bookable_refunds_required_total";

/// Counter: bookings cancelled (renter, owner, or payment failure).
pub const BOOKINGS_CANCELLED_TOTAL: &str = "bookable_bookings_cancelled_total";

/// Counter: time-driven sweep transitions (activations + completions).
pub const SWEEP_TRANSITIONS_TOTAL: &str = "bookable_sweep_transitions_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: items with a tracked calendar.
pub const ITEMS_TRACKED: &str = "bookable_items_tracked";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "bookable_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "bookable_wal_flush_batch_size";

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
