use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for the application's metrics.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "vin_resolutions_total",
        "VIN resolutions by result source (local, external, none)"
    );
    metrics::describe_counter!(
        "vin_decoder_failures_total",
        "External VIN decoder calls that failed"
    );
    metrics::describe_counter!(
        "vin_scan_detections_total",
        "VINs detected by scan sessions, by strategy"
    );
    metrics::describe_histogram!(
        "vin_ocr_pass_seconds",
        metrics::Unit::Seconds,
        "Duration of one OCR pass over a scanned frame"
    );
    metrics::describe_gauge!(
        "vin_scan_sessions_active",
        "Scan sessions currently registered"
    );
}

/// Prometheus scrape endpoint, text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
