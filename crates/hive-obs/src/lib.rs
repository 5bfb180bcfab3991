//! Observability utilities: harness-side prometheus metrics

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder,
};

static INFLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    prometheus::register_int_gauge!("hive_inflight_requests", "Requests currently admitted by the gate").unwrap()
});
static CONCURRENCY: Lazy<IntGauge> = Lazy::new(|| {
    prometheus::register_int_gauge!("hive_current_concurrency", "Effective concurrency of the running level").unwrap()
});
static ATTEMPTS: Lazy<IntCounter> = Lazy::new(|| {
    prometheus::register_int_counter!("hive_attempts_total", "Client attempts issued, retries included").unwrap()
});
static FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    prometheus::register_int_counter_vec!(
        Opts::new("hive_attempt_failures_total", "Failed attempts by kind"),
        &["kind"]
    )
    .unwrap()
});
static LATENCY: Lazy<Histogram> = Lazy::new(|| {
    let buckets = vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];
    prometheus::register_histogram!(
        HistogramOpts::new("hive_request_latency_seconds", "End-to-end request latency, retries included")
            .buckets(buckets)
    )
    .unwrap()
});

pub fn init() {
    // Touch statics so every collector shows up in the first scrape.
    let _ = &*INFLIGHT;
    let _ = &*CONCURRENCY;
    let _ = &*ATTEMPTS;
    let _ = &*FAILURES;
    let _ = &*LATENCY;
}

pub fn inflight_inc() { INFLIGHT.inc() }

pub fn inflight_dec() { INFLIGHT.dec() }

pub fn set_concurrency(level: usize) { CONCURRENCY.set(level as i64) }

pub fn record_attempt() { ATTEMPTS.inc() }

pub fn record_failure(kind: &str) { FAILURES.with_label_values(&[kind]).inc() }

pub fn observe_latency(secs: f64) { LATENCY.observe(secs) }

/// Text exposition of everything in the default registry.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!("failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
