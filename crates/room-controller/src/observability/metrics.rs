//! Metrics definitions for Room Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rc_` prefix for Room Controller
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `operation`: store operations (find_one, insert_one_bounded, ...) or
//!   coordinator operations (create_room, close_room, ...)
//! - `status`: success, conflict, error
//! - `outcome`: `ok` or a `RoomError::error_code()` value
//! - `step`: reconciliation steps (creator_go_live, creator_release,
//!   audience_release)

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used by the
/// `/metrics` endpoint.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Store round-trips should stay well under 50ms
        .set_buckets_for_metric(
            Matcher::Prefix("rc_store_operation".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set store operation buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Store Metrics
// ============================================================================

/// Record a document store round-trip.
///
/// Metric: `rc_store_operation_duration_seconds`, `rc_store_operations_total`
/// Labels: `operation`, `status`
pub fn record_store_operation(operation: &str, status: &str, duration: Duration) {
    histogram!("rc_store_operation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("rc_store_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Coordinator Metrics
// ============================================================================

/// Record a completed coordinator operation.
///
/// Metric: `rc_room_operations_total`
/// Labels: `operation`, `outcome`
pub fn record_room_operation(operation: &str, outcome: &str) {
    counter!("rc_room_operations_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a failed best-effort reconciliation step.
///
/// Metric: `rc_reconciliation_failures_total`
/// Labels: `step`
pub fn record_reconciliation_failure(step: &str) {
    counter!("rc_reconciliation_failures_total",
        "step" => step.to_string()
    )
    .increment(1);
}
