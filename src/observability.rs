use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations executed. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "dutyplan_operations_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "dutyplan_operation_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: services created, including generated successors. Labels: origin.
pub const SERVICES_CREATED_TOTAL: &str = "dutyplan_services_created_total";

/// Counter: services deleted, including cascaded successors. Labels: origin.
pub const SERVICES_DELETED_TOTAL: &str = "dutyplan_services_deleted_total";

/// Gauge: live services held by the engine.
pub const SERVICES_ACTIVE: &str = "dutyplan_services_active";

/// Counter: coverage diagnostics that reported violations. Labels: kind.
pub const COVERAGE_SHORTFALLS_TOTAL: &str = "dutyplan_coverage_shortfalls_total";

/// Counter: double-booking checks run after writes. Labels: outcome.
pub const CONFLICT_CHECKS_TOTAL: &str = "dutyplan_conflict_checks_total";

/// Counter: writes rolled back by the conflict hook.
pub const ROLLBACKS_TOTAL: &str = "dutyplan_rollbacks_total";

// ── WAL ─────────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "dutyplan_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (transactions per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "dutyplan_wal_flush_batch_size";

/// Counter: compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "dutyplan_wal_compactions_total";

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

/// Record status + latency for one engine operation.
pub fn record_operation<T, E>(op: &'static str, started: std::time::Instant, result: &Result<T, E>) {
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}
