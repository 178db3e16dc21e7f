//! Metrics definitions for the session controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `sc_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Every label is bounded by a closed enum in code:
//! - `bucket`: 4 values (self, primary, secondary_grid, audio_only)
//! - `reason`: 3 policy reasons
//! - `transition`: 4 values (start, pause, resume, stop)
//! - `request`: 8 signaling request names
//! - `kind`: 4 values (audio, video, screen, consumer)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return its handle.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Grid rebuilds are pure in-memory work; microsecond-scale buckets
        .set_buckets_for_metric(
            Matcher::Full("sc_grid_rebuild_seconds".to_string()),
            &[0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.010],
        )
        .map_err(|e| format!("Failed to set grid rebuild buckets: {e}"))?
        // Signaling round trips
        .set_buckets_for_metric(
            Matcher::Prefix("sc_signaling".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500,
            ],
        )
        .map_err(|e| format!("Failed to set signaling latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Classification & Layout
// ============================================================================

/// Record a classified track.
///
/// Metric: `sc_classifications_total`
/// Labels: `bucket`
pub fn record_classification(bucket: &'static str) {
    counter!("sc_classifications_total", "bucket" => bucket).increment(1);
}

/// Record a full grid rebuild.
///
/// Metric: `sc_grid_rebuild_seconds`
/// Labels: none
pub fn record_grid_rebuild(duration: Duration) {
    histogram!("sc_grid_rebuild_seconds").record(duration.as_secs_f64());
}

/// Set the number of classified streams.
///
/// Metric: `sc_streams_active`
/// Labels: none
pub fn set_streams_active(count: usize) {
    // usize to f64 conversion is safe for realistic stream counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("sc_streams_active").set(count as f64);
}

// ============================================================================
// Policy & Recording
// ============================================================================

/// Record a rejected display policy change.
///
/// Metric: `sc_policy_rejections_total`
/// Labels: `reason`
pub fn record_policy_rejection(reason: &'static str) {
    counter!("sc_policy_rejections_total", "reason" => reason).increment(1);
}

/// Record an accepted recording transition.
///
/// Metric: `sc_recording_transitions_total`
/// Labels: `transition`
pub fn record_recording_transition(transition: &'static str) {
    counter!("sc_recording_transitions_total", "transition" => transition).increment(1);
}

// ============================================================================
// Signaling & Transport
// ============================================================================

/// Record a signaling request round trip.
///
/// Metric: `sc_signaling_latency_seconds`
/// Labels: `request`
pub fn record_signaling_latency(request: &'static str, duration: Duration) {
    histogram!("sc_signaling_latency_seconds", "request" => request)
        .record(duration.as_secs_f64());
}

/// Record a best-effort teardown failure.
///
/// Metric: `sc_teardown_failures_total`
/// Labels: `kind`
///
/// Non-zero values mean the transport library refused to release something;
/// teardown continued regardless.
pub fn record_teardown_failure(kind: &'static str) {
    counter!("sc_teardown_failures_total", "kind" => kind).increment(1);
}
