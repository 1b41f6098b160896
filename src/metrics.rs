/// Metrics and telemetry for CertVerify
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Certificate issuance, verification and revocation outcomes
/// - Degraded calls to the ledger, content store and mailer

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    /// Active HTTP requests
    pub static ref HTTP_REQUESTS_ACTIVE: IntGauge = register_int_gauge!(
        "http_requests_active",
        "Number of HTTP requests currently being processed"
    )
    .unwrap();

    // ========== Certificate Metrics ==========

    /// Issued certificates by ledger outcome (anchored, supplied, unanchored)
    pub static ref CERTIFICATES_ISSUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "certificates_issued_total",
        "Total number of certificates issued",
        &["ledger"]
    )
    .unwrap();

    /// Verification requests by method and verdict
    pub static ref VERIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "certificate_verifications_total",
        "Total number of certificate verifications",
        &["method", "verdict"]
    )
    .unwrap();

    /// Revocations by ledger outcome
    pub static ref REVOCATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "certificate_revocations_total",
        "Total number of certificate revocations",
        &["ledger"]
    )
    .unwrap();

    // ========== Collaborator Metrics ==========

    /// Collaborator calls that failed and were degraded
    pub static ref DEGRADED_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "degraded_calls_total",
        "Total number of collaborator calls that degraded",
        &["service", "operation"]
    )
    .unwrap();

    // ========== Account Metrics ==========

    /// Account creations by role
    pub static ref ACCOUNT_CREATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "account_creations_total",
        "Total number of accounts created",
        &["role"]
    )
    .unwrap();

    /// Issuer approval transitions by action
    pub static ref APPROVAL_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "approval_transitions_total",
        "Total number of issuer approval transitions",
        &["action"]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
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

/// Record a certificate issuance
pub fn record_issuance(ledger: &str) {
    CERTIFICATES_ISSUED_TOTAL.with_label_values(&[ledger]).inc();
}

/// Record a verification verdict
pub fn record_verification(method: &str, is_valid: bool) {
    VERIFICATIONS_TOTAL
        .with_label_values(&[method, if is_valid { "valid" } else { "invalid" }])
        .inc();
}

/// Record a revocation
pub fn record_revocation(ledger: &str) {
    REVOCATIONS_TOTAL.with_label_values(&[ledger]).inc();
}

/// Record a degraded collaborator call
pub fn record_degraded(service: &str, operation: &str) {
    DEGRADED_CALLS_TOTAL
        .with_label_values(&[service, operation])
        .inc();
}

/// Record an account creation
pub fn record_account_creation(role: &str) {
    ACCOUNT_CREATIONS_TOTAL.with_label_values(&[role]).inc();
}

/// Record an approval transition
pub fn record_approval_transition(action: &str) {
    APPROVAL_TRANSITIONS_TOTAL.with_label_values(&[action]).inc();
}
