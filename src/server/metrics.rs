use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;
use tracing::error;

/// Metric name prefix for all Phonotek metrics
const PREFIX: &str = "phonotek";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Delivery Metrics
    pub static ref DELIVERY_JOBS_STARTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_delivery_jobs_started_total"), "Delivery jobs started"),
        &["mode"]
    ).expect("Failed to create delivery_jobs_started_total metric");

    pub static ref DELIVERY_JOBS_COMPLETED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_delivery_jobs_completed_total"),
        "Delivery jobs completed"
    ).expect("Failed to create delivery_jobs_completed_total metric");

    pub static ref DELIVERY_JOBS_FAILED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_delivery_jobs_failed_total"), "Delivery jobs failed"),
        &["kind"]
    ).expect("Failed to create delivery_jobs_failed_total metric");

    pub static ref DELIVERY_ACTIVE_JOBS: Gauge = Gauge::new(
        format!("{PREFIX}_delivery_active_jobs"),
        "Job rows currently held in the registry"
    ).expect("Failed to create delivery_active_jobs metric");

    pub static ref DELIVERY_ARTIFACT_BYTES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_delivery_artifact_bytes_total"),
        "Bytes of produced archives"
    ).expect("Failed to create delivery_artifact_bytes_total metric");

    pub static ref DELIVERY_ARTIFACTS_DELETED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_delivery_artifacts_deleted_total"), "Artifacts deleted"),
        &["reason"]
    ).expect("Failed to create delivery_artifacts_deleted_total metric");

    // Catalog Metrics
    pub static ref CATALOG_ITEMS_TOTAL: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_catalog_items_total"), "Total items in collection"),
        &["type"]
    ).expect("Failed to create catalog_items_total metric");
}

/// Register all metrics with the registry. Call once at startup.
pub fn init_metrics() {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(DELIVERY_JOBS_STARTED_TOTAL.clone()),
        Box::new(DELIVERY_JOBS_COMPLETED_TOTAL.clone()),
        Box::new(DELIVERY_JOBS_FAILED_TOTAL.clone()),
        Box::new(DELIVERY_ACTIVE_JOBS.clone()),
        Box::new(DELIVERY_ARTIFACT_BYTES_TOTAL.clone()),
        Box::new(DELIVERY_ARTIFACTS_DELETED_TOTAL.clone()),
        Box::new(CATALOG_ITEMS_TOTAL.clone()),
    ];
    for metric in metrics {
        if let Err(e) = REGISTRY.register(metric) {
            error!("Failed to register metric: {}", e);
        }
    }
}

/// Seed the collection gauges from the store counts.
pub fn init_catalog_metrics(artists: usize, albums: usize, songs: usize) {
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["artist"])
        .set(artists as f64);
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["album"])
        .set(albums as f64);
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["song"])
        .set(songs as f64);
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let endpoint = categorize_endpoint(path);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration.as_secs_f64());
}

pub fn record_delivery_started(mode: &str) {
    DELIVERY_JOBS_STARTED_TOTAL.with_label_values(&[mode]).inc();
}

pub fn record_delivery_completed(artifact_size: u64) {
    DELIVERY_JOBS_COMPLETED_TOTAL.inc();
    DELIVERY_ARTIFACT_BYTES_TOTAL.inc_by(artifact_size as f64);
}

pub fn record_delivery_failed(kind: &'static str) {
    DELIVERY_JOBS_FAILED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_artifact_deleted(reason: &'static str) {
    DELIVERY_ARTIFACTS_DELETED_TOTAL
        .with_label_values(&[reason])
        .inc();
}

pub fn set_active_jobs(count: usize) {
    DELIVERY_ACTIVE_JOBS.set(count as f64);
}

/// Collapse concrete request paths to low-cardinality endpoint labels.
pub fn categorize_endpoint(path: &str) -> &'static str {
    if path == "/" {
        return "/";
    }
    if path == "/metrics" {
        return "/metrics";
    }
    if path.starts_with("/v1/delivery/albums/") {
        return "/v1/delivery/albums/{id}";
    }
    if path.starts_with("/v1/delivery/jobs/") {
        if path.ends_with("/archive") {
            return "/v1/delivery/jobs/{id}/archive";
        }
        if path.ends_with("/extract") {
            return "/v1/delivery/jobs/{id}/extract";
        }
        if path.ends_with("/cancel-deletion") {
            return "/v1/delivery/jobs/{id}/cancel-deletion";
        }
        return "/v1/delivery/jobs/{id}";
    }
    if path == "/v1/delivery/jobs" {
        return "/v1/delivery/jobs";
    }
    if path.starts_with("/v1/catalog/albums/") {
        return "/v1/catalog/albums/{id}";
    }
    if path == "/v1/catalog/albums" {
        return "/v1/catalog/albums";
    }
    if path.starts_with("/v1/catalog/artists/") {
        return "/v1/catalog/artists/{id}";
    }
    "other"
}

/// Handler for GET /metrics (Prometheus text exposition format).
pub async fn render_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (StatusCode::OK, buffer).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
