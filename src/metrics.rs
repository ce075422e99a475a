/// Metrics and telemetry for the worksheet market
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Ledger operations by outcome
/// - Points credited and debited
/// - Background job execution

use crate::error::{MarketError, MarketResult};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("http_requests_total registers once");

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("http_request_duration_seconds registers once");

    // ========== Ledger Metrics ==========

    /// Ledger operations by operation and outcome code
    pub static ref LEDGER_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ledger_operations_total",
        "Total number of ledger operations",
        &["operation", "outcome"]
    )
    .expect("ledger_operations_total registers once");

    /// Points credited by transaction kind
    pub static ref POINTS_CREDITED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "points_credited_total",
        "Total points credited to accounts",
        &["kind"]
    )
    .expect("points_credited_total registers once");

    /// Points debited by transaction kind
    pub static ref POINTS_DEBITED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "points_debited_total",
        "Total points debited from accounts",
        &["kind"]
    )
    .expect("points_debited_total registers once");

    /// Uploaded files by bucket
    pub static ref FILE_UPLOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "file_uploads_total",
        "Total number of uploaded files",
        &["bucket"]
    )
    .expect("file_uploads_total registers once");

    /// Notifications written
    pub static ref NOTIFICATIONS_TOTAL: IntCounter = register_int_counter!(
        "notifications_total",
        "Total number of notifications written"
    )
    .expect("notifications_total registers once");

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .expect("background_jobs_total registers once");

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("background_job_duration_seconds registers once");

    /// Application start time (unix seconds)
    pub static ref STARTED_AT_SECONDS: IntGauge = register_int_gauge!(
        "started_at_seconds",
        "Unix time the process started"
    )
    .expect("started_at_seconds registers once");
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> MarketResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| MarketError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| MarketError::Internal(format!("Metrics are not UTF-8: {}", e)))
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record the outcome of a ledger operation
pub fn record_ledger_operation<T>(operation: &str, result: &MarketResult<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    LEDGER_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Record a signed point movement
pub fn record_points(kind: &str, amount: i64) {
    if amount >= 0 {
        POINTS_CREDITED_TOTAL
            .with_label_values(&[kind])
            .inc_by(amount as u64);
    } else {
        POINTS_DEBITED_TOTAL
            .with_label_values(&[kind])
            .inc_by(amount.unsigned_abs());
    }
}

/// Record a file upload
pub fn record_file_upload(bucket: &str) {
    FILE_UPLOADS_TOTAL.with_label_values(&[bucket]).inc();
}

/// Record notifications written
pub fn record_notifications(count: u64) {
    NOTIFICATIONS_TOTAL.inc_by(count);
}

/// Remember the process start time, once
pub fn mark_started() {
    if STARTED_AT_SECONDS.get() == 0 {
        STARTED_AT_SECONDS.set(chrono::Utc::now().timestamp());
    }
}

/// Seconds since `mark_started`, zero if it never ran
pub fn uptime_seconds() -> i64 {
    match STARTED_AT_SECONDS.get() {
        0 => 0,
        started => (chrono::Utc::now().timestamp() - started).max(0),
    }
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_ledger_counters() {
        let ok: MarketResult<()> = Ok(());
        record_ledger_operation("checkout", &ok);
        record_ledger_operation::<()>("checkout", &Err(MarketError::AlreadyOwned));
        record_points("purchase", -250);
        record_points("signup_bonus", 1000);

        let text = render_metrics().unwrap();
        assert!(text.contains("ledger_operations_total"));
        assert!(text.contains("AlreadyOwned"));
        assert!(text.contains("points_debited_total"));
    }

    #[test]
    fn test_http_request_recording() {
        record_http_request("GET", "/health", 200, 0.002);
        let count = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .get();
        assert!(count >= 1);
    }
}
