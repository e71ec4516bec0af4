//! Prometheus metrics for session lifecycle observability
//!
//! All metrics live in the default registry; [`render`] produces the text
//! exposition served on `/metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge_vec, Encoder, Histogram,
    IntCounterVec, IntGaugeVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Registry Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Sessions in the current published snapshot.
    ///
    /// Labels:
    /// - kind: "browser" or "codebase"
    pub static ref ACTIVE_SESSIONS: IntGaugeVec = register_int_gauge_vec!(
        "aim_active_sessions",
        "Sessions in the current registry snapshot",
        &["kind"]
    ).expect("failed to register ACTIVE_SESSIONS metric");

    /// Failed registry transitions, by operation kind
    /// (e.g. "add_user_context_failed", "get_user_project_not_found").
    pub static ref REGISTRY_ERRORS: IntCounterVec = register_int_counter_vec!(
        "aim_registry_errors_total",
        "Registry transitions that returned an error",
        &["operation"]
    ).expect("failed to register REGISTRY_ERRORS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Reaper Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Sessions the reaper tried to evict.
    ///
    /// Labels:
    /// - kind: "browser" or "codebase"
    /// - outcome: "removed" or "failed"
    pub static ref SESSIONS_REAPED: IntCounterVec = register_int_counter_vec!(
        "aim_sessions_reaped_total",
        "Inactive sessions evicted by the reaper",
        &["kind", "outcome"]
    ).expect("failed to register SESSIONS_REAPED metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Devbox Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Readiness probe latency in seconds, successful or not.
    pub static ref READINESS_CHECK_DURATION: Histogram = register_histogram!(
        "aim_readiness_check_duration_seconds",
        "Devbox readiness probe duration",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).expect("failed to register READINESS_CHECK_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // API Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// HTTP requests handled, by matched route and status code.
    pub static ref API_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "aim_api_requests_total",
        "HTTP requests handled by the API",
        &["route", "status"]
    ).expect("failed to register API_REQUESTS metric");
}

/// Text exposition of every registered metric
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
