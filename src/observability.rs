use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings accepted.
pub const BOOKINGS_CREATED_TOTAL: &str = "deskbook_bookings_created_total";

/// Counter: booking requests refused by a validation rule.
pub const BOOKINGS_REJECTED_TOTAL: &str = "deskbook_bookings_rejected_total";

/// Counter: successful check-ins.
pub const CHECKINS_TOTAL: &str = "deskbook_checkins_total";

/// Counter: successful checkouts.
pub const CHECKOUTS_TOTAL: &str = "deskbook_checkouts_total";

/// Counter: user-driven cancellations.
pub const CANCELLATIONS_TOTAL: &str = "deskbook_cancellations_total";

/// Counter: cancellations performed by the no-show sweep.
pub const NO_SHOW_CANCELLATIONS_TOTAL: &str = "deskbook_no_show_cancellations_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "deskbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "deskbook_wal_flush_batch_size";

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
