//! Prometheus metrics for skills-service.
//!
//! Recording helpers are no-ops until `init_metrics` has run.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// HTTP metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();

// Assistant metrics
pub static ASSISTANT_TURNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static ASSISTANT_RUN_POLLS: OnceLock<HistogramVec> = OnceLock::new();

// Journal metrics
pub static JOURNAL_FAILURES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Later calls are no-ops.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let http_requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )?;

    let http_request_duration = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
        ]),
        &["method", "path", "status"],
    )?;

    // outcome: ok or the assistant error kind
    let assistant_turns = IntCounterVec::new(
        Opts::new("assistant_turns_total", "Total chat turns by outcome"),
        &["skill", "outcome"],
    )?;

    let run_polls = HistogramVec::new(
        HistogramOpts::new(
            "assistant_run_polls",
            "Status polls needed for a run to complete",
        )
        .buckets(vec![1.0, 2.0, 3.0, 5.0, 10.0, 20.0, 40.0, 60.0]),
        &["skill"],
    )?;

    let journal_failures = IntCounterVec::new(
        Opts::new("journal_failures_total", "Failed conversation journal appends"),
        &["role"],
    )?;

    registry.register(Box::new(http_requests_total.clone()))?;
    registry.register(Box::new(http_request_duration.clone()))?;
    registry.register(Box::new(assistant_turns.clone()))?;
    registry.register(Box::new(run_polls.clone()))?;
    registry.register(Box::new(journal_failures.clone()))?;

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(http_requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(http_request_duration);
    let _ = ASSISTANT_TURNS_TOTAL.set(assistant_turns);
    let _ = ASSISTANT_RUN_POLLS.set(run_polls);
    let _ = JOURNAL_FAILURES_TOTAL.set(journal_failures);

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}

/// Record a completed HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status = status.to_string();
    if let Some(counter) = HTTP_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[method, path, &status]).inc();
    }
    if let Some(histogram) = HTTP_REQUEST_DURATION_SECONDS.get() {
        histogram
            .with_label_values(&[method, path, &status])
            .observe(duration_secs);
    }
}

pub fn record_turn(skill: &str, outcome: &str) {
    if let Some(counter) = ASSISTANT_TURNS_TOTAL.get() {
        counter.with_label_values(&[skill, outcome]).inc();
    }
}

pub fn observe_run_polls(skill: &str, polls: u32) {
    if let Some(histogram) = ASSISTANT_RUN_POLLS.get() {
        histogram.with_label_values(&[skill]).observe(f64::from(polls));
    }
}

pub fn record_journal_failure(role: &str) {
    if let Some(counter) = JOURNAL_FAILURES_TOTAL.get() {
        counter.with_label_values(&[role]).inc();
    }
}
