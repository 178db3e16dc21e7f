//! Observability for the session controller.
//!
//! Metric labels are bounded by closed enums in code.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `sc_classifications_total` | Counter | `bucket` | Tracks classified per bucket |
//! | `sc_grid_rebuild_seconds` | Histogram | none | Full grid rebuild time |
//! | `sc_streams_active` | Gauge | none | Classified streams in the session |
//! | `sc_policy_rejections_total` | Counter | `reason` | Rejected display policy changes |
//! | `sc_recording_transitions_total` | Counter | `transition` | Accepted recording transitions |
//! | `sc_signaling_latency_seconds` | Histogram | `request` | Signaling round trip |
//! | `sc_teardown_failures_total` | Counter | `kind` | Best-effort teardown failures |

pub mod metrics;

pub use metrics::init_metrics_recorder;
