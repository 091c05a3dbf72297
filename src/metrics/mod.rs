// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics,
    ACTIVE_VERSION,
    BUCKET_DELETIONS,
    CACHE_OPERATIONS,
    FETCHES_TOTAL,
    FETCH_DURATION,
    INSTALLS,
    LIFECYCLE_TRANSITIONS,
    MESSAGES,
};

/// Helper to record an intercepted request
pub fn record_fetch(class: &str, source: &str, duration_secs: f64) {
    FETCHES_TOTAL.with_label_values(&[class, source]).inc();
    FETCH_DURATION.with_label_values(&[class]).observe(duration_secs);
}

/// Helper to record cache operations (hit, miss, write, write_failure)
pub fn record_cache_operation(operation: &str) {
    CACHE_OPERATIONS.with_label_values(&[operation]).inc();
}

pub fn record_bucket_deletion() {
    BUCKET_DELETIONS.with_label_values(&["superseded"]).inc();
}

/// Helper to record install outcomes
pub fn record_install(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    INSTALLS.with_label_values(&[outcome]).inc();
}

pub fn record_transition(state: &str) {
    LIFECYCLE_TRANSITIONS.with_label_values(&[state]).inc();
}

/// Point the active-version gauge at `version`
pub fn set_active_version(version: &str) {
    ACTIVE_VERSION.reset();
    ACTIVE_VERSION.with_label_values(&[version]).set(1.0);
}

pub fn record_message(message_type: &str) {
    MESSAGES.with_label_values(&[message_type]).inc();
}
