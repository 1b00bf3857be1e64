use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all Lectern metrics
const PREFIX: &str = "lectern";

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

    // Authentication Metrics
    pub static ref AUTH_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_auth_requests_total"), "Bearer token verifications"),
        &["status"]
    ).expect("Failed to create auth_requests_total metric");

    // Rate Limiting Metrics
    pub static ref RATE_LIMIT_HITS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_rate_limit_hits_total"), "Rate limit violations"),
        &[]
    ).expect("Failed to create rate_limit_hits_total metric");

    // Catalog Metrics
    pub static ref CATALOG_ITEMS_TOTAL: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_catalog_items_total"), "Total items in catalog"),
        &["type"]
    ).expect("Failed to create catalog_items_total metric");

    // Streaming Metrics
    pub static ref STREAMS_STARTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_streams_started_total"), "Lecture streams started"),
        &["format"]
    ).expect("Failed to create streams_started_total metric");

    pub static ref PRESIGNED_URLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_presigned_urls_total"), "Presigned audio URLs issued"),
        &["backend"]
    ).expect("Failed to create presigned_urls_total metric");

    // Error Metrics
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_errors_total"), "API errors by status code"),
        &["status"]
    ).expect("Failed to create errors_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(AUTH_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RATE_LIMIT_HITS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_ITEMS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(STREAMS_STARTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PRESIGNED_URLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ERRORS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Initialize catalog-specific metrics
pub fn init_catalog_metrics(num_speakers: usize, num_collections: usize, num_lectures: usize) {
    CATALOG_ITEMS_TOTAL
        .with_label_values(&["speaker"])
        .set(num_speakers as f64);

    CATALOG_ITEMS_TOTAL
        .with_label_values(&["collection"])
        .set(num_collections as f64);

    CATALOG_ITEMS_TOTAL
        .with_label_values(&["lecture"])
        .set(num_lectures as f64);

    tracing::info!(
        "Catalog metrics initialized: {} speakers, {} collections, {} lectures",
        num_speakers,
        num_collections,
        num_lectures
    );
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

/// Record a bearer token verification outcome
pub fn record_auth_request(status: &str) {
    AUTH_REQUESTS_TOTAL.with_label_values(&[status]).inc();
}

/// Record a rate limit hit
pub fn record_rate_limit_hit() {
    RATE_LIMIT_HITS_TOTAL.with_label_values(&[]).inc();
}

/// Record a stream start
pub fn record_stream_started(format: &str) {
    STREAMS_STARTED_TOTAL.with_label_values(&[format]).inc();
}

/// Record an issued presigned URL
pub fn record_presigned_url(backend: &str) {
    PRESIGNED_URLS_TOTAL.with_label_values(&[backend]).inc();
}

/// Record an API error response
pub fn record_error(status: u16) {
    ERRORS_TOTAL
        .with_label_values(&[&status.to_string()])
        .inc();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        init_metrics();

        let metric_families = REGISTRY.gather();
        assert!(!metric_families.is_empty(), "Metrics should be registered");
    }

    #[test]
    fn test_record_http_request() {
        init_metrics();

        record_http_request(
            "GET",
            "/v1/catalog/lecture/123",
            200,
            Duration::from_millis(50),
        );

        let metrics = REGISTRY.gather();
        let http_metrics = metrics
            .iter()
            .find(|m| m.get_name() == "lectern_http_requests_total");

        assert!(http_metrics.is_some(), "HTTP request metrics should exist");
    }

    #[test]
    fn test_record_auth_and_stream_metrics() {
        init_metrics();

        record_auth_request("ok");
        record_auth_request("rejected");
        record_stream_started("MP3");
        record_presigned_url("s3");

        let metrics = REGISTRY.gather();
        assert!(metrics
            .iter()
            .any(|m| m.get_name() == "lectern_auth_requests_total"));
        assert!(metrics
            .iter()
            .any(|m| m.get_name() == "lectern_streams_started_total"));
    }

    #[test]
    fn test_catalog_metrics() {
        init_metrics();

        init_catalog_metrics(10, 40, 500);

        let metrics = REGISTRY.gather();
        let catalog_metrics = metrics
            .iter()
            .find(|m| m.get_name() == "lectern_catalog_items_total");

        assert!(catalog_metrics.is_some(), "Catalog metrics should exist");
    }
}
