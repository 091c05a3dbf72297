// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec_with_registry, register_gauge_vec_with_registry,
    register_histogram_vec_with_registry, CounterVec, Encoder, GaugeVec, HistogramVec, Opts,
    Registry, TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // INTERCEPTION METRICS
    // ============================================================================

    /// Intercepted requests by resource class and where the response came from
    pub static ref FETCHES_TOTAL: CounterVec = register_counter_vec_with_registry!(
        Opts::new("fetches_total", "Total intercepted requests"),
        &["class", "source"], // source: cache, network, offline_fallback, passthrough, failed
        REGISTRY
    ).unwrap();

    /// Time to produce a response for an intercepted request
    pub static ref FETCH_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("fetch_duration_seconds", "Intercepted request duration in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["class"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // CACHE METRICS
    // ============================================================================

    /// Cache operations
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("cache_operations_total", "Total cache operations"),
        &["operation"], // operation: hit, miss, write, write_failure
        REGISTRY
    ).unwrap();

    /// Buckets deleted during activation
    pub static ref BUCKET_DELETIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("bucket_deletions_total", "Total cache buckets deleted"),
        &["reason"], // reason: superseded
        REGISTRY
    ).unwrap();

    // ============================================================================
    // LIFECYCLE METRICS
    // ============================================================================

    /// Install attempts by outcome
    pub static ref INSTALLS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("installs_total", "Total coordinator installs"),
        &["outcome"], // outcome: success, failure
        REGISTRY
    ).unwrap();

    /// Lifecycle transitions
    pub static ref LIFECYCLE_TRANSITIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("lifecycle_transitions_total", "Total lifecycle state transitions"),
        &["state"],
        REGISTRY
    ).unwrap();

    /// Currently active release (value is always 1, labelled by version)
    pub static ref ACTIVE_VERSION: GaugeVec = register_gauge_vec_with_registry!(
        Opts::new("active_version", "Currently active coordinator version"),
        &["version"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // MESSAGING METRICS
    // ============================================================================

    /// Client messages received
    pub static ref MESSAGES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("client_messages_total", "Total client messages received"),
        &["type"], // type: SKIP_WAITING, CHECK_UPDATE
        REGISTRY
    ).unwrap();
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
