use crate::views::FlushOutcome;
use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all view tracker metrics
const PREFIX: &str = "view_tracker";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Write path
    pub static ref VIEWS_MARKED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_views_marked_total"),
        "Total view events recorded in the cache"
    ).expect("Failed to create views_marked_total metric");

    // Flush
    pub static ref VIEWS_FLUSHED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_views_flushed_total"),
        "Total pending views written to durable storage"
    ).expect("Failed to create views_flushed_total metric");

    pub static ref MALFORMED_PENDING_VIEWS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_malformed_pending_views_total"),
        "Total malformed pending entries discarded"
    ).expect("Failed to create malformed_pending_views_total metric");

    pub static ref FLUSH_TICKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_flush_ticks_total"), "Flush ticks by outcome"),
        &["status"]
    ).expect("Failed to create flush_ticks_total metric");

    pub static ref FLUSH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_flush_duration_seconds"),
            "Flush tick duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0])
    ).expect("Failed to create flush_duration_seconds metric");

    pub static ref PENDING_VIEWS: Gauge = Gauge::new(
        format!("{PREFIX}_pending_views"),
        "Entries waiting in the pending log after the last flush"
    ).expect("Failed to create pending_views metric");

    // HTTP
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(VIEWS_MARKED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(VIEWS_FLUSHED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MALFORMED_PENDING_VIEWS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FLUSH_TICKS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(FLUSH_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(PENDING_VIEWS.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_views_marked(count: usize) {
    VIEWS_MARKED_TOTAL.inc_by(count as f64);
}

/// Record a flush tick that completed without error
pub fn record_flush_outcome(outcome: &FlushOutcome) {
    let status = if outcome.is_empty() { "empty" } else { "success" };
    FLUSH_TICKS_TOTAL.with_label_values(&[status]).inc();
    FLUSH_DURATION_SECONDS.observe(outcome.duration.as_secs_f64());
    VIEWS_FLUSHED_TOTAL.inc_by(outcome.flushed as f64);
    MALFORMED_PENDING_VIEWS_TOTAL.inc_by(outcome.discarded as f64);
}

pub fn record_flush_failure(duration: Duration) {
    FLUSH_TICKS_TOTAL.with_label_values(&["failed"]).inc();
    FLUSH_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn set_pending_views(count: usize) {
    PENDING_VIEWS.set(count as f64);
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
