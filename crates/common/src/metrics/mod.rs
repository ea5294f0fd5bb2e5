//! Metrics and observability utilities
//!
//! Provides Prometheus-friendly metrics with standardized naming conventions.
//! Recording is a no-op until a recorder (the gateway's Prometheus exporter)
//! is installed.

use metrics::{counter, describe_counter, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all RuleForge metrics
pub const METRICS_PREFIX: &str = "ruleforge";

/// Buckets for explain stream latency (in seconds), time to last event
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Buckets for embedding latency (typically slower)
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Explain metrics
    describe_counter!(
        format!("{}_explain_streams_total", METRICS_PREFIX),
        Unit::Count,
        "Explain streams by terminal outcome"
    );

    describe_histogram!(
        format!("{}_explain_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Time from first pull to terminal event"
    );

    describe_counter!(
        format!("{}_explain_events_total", METRICS_PREFIX),
        Unit::Count,
        "Events emitted by explain streams"
    );

    // Search metrics
    describe_counter!(
        format!("{}_vector_searches_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of vector searches"
    );

    describe_histogram!(
        format!("{}_vector_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Vector search latency in seconds"
    );

    // Index metrics
    describe_counter!(
        format!("{}_points_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Total points upserted into the collection"
    );

    describe_counter!(
        format!("{}_documents_deleted_total", METRICS_PREFIX),
        Unit::Count,
        "Total document deletions"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
        gauge!(
            format!("{}_embedding_batch_size", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .set(batch_size as f64);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record vector search metrics
pub fn record_search(duration_secs: f64, backend: &str, result_count: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_vector_searches_total", METRICS_PREFIX),
        "backend" => backend.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_vector_search_duration_seconds", METRICS_PREFIX),
        "backend" => backend.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_vector_search_results_count", METRICS_PREFIX),
        "backend" => backend.to_string()
    )
    .set(result_count as f64);
}

/// Helper to record indexing metrics
pub fn record_indexing(backend: &str, points: usize) {
    counter!(
        format!("{}_points_indexed_total", METRICS_PREFIX),
        "backend" => backend.to_string()
    )
    .increment(points as u64);
}

/// Helper to record document deletions
pub fn record_deletion(backend: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_documents_deleted_total", METRICS_PREFIX),
        "backend" => backend.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Helper to record one emitted explain event
pub fn record_explain_event(event_type: &'static str) {
    counter!(
        format!("{}_explain_events_total", METRICS_PREFIX),
        "type" => event_type
    )
    .increment(1);
}

/// Helper to record the terminal outcome of an explain stream
pub fn record_explain(duration_secs: f64, outcome: &'static str) {
    counter!(
        format!("{}_explain_streams_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        format!("{}_explain_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome
    )
    .record(duration_secs);
}
