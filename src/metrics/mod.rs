//! Prometheus metrics for the sync engine
//!
//! This module provides metrics tracking for:
//! - Fetcher: attempts by endpoint and outcome, cache hits
//! - Persistence: upsert outcomes, dropped records
//! - Runs: wall-clock duration
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails or never happens, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_histogram, CounterVec, Encoder, Histogram, TextEncoder,
};
use std::sync::OnceLock;

/// Container for all sync metrics
struct SyncMetrics {
    fetch_attempts: CounterVec,
    cache_hits: CounterVec,
    upserts: CounterVec,
    records_dropped: CounterVec,
    sync_duration: Histogram,
}

/// Global storage for sync metrics
static SYNC_METRICS: OnceLock<SyncMetrics> = OnceLock::new();

/// Register all Prometheus metrics
///
/// Safe to call more than once; only the first successful call registers.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if SYNC_METRICS.get().is_some() {
        return Ok(());
    }

    let metrics = SyncMetrics {
        fetch_attempts: register_counter_vec!(
            "eventsync_fetch_attempts_total",
            "Upstream fetch attempts by endpoint and outcome",
            &["endpoint", "outcome"]
        )?,
        cache_hits: register_counter_vec!(
            "eventsync_cache_hits_total",
            "Requests served from the run-scoped response cache",
            &["endpoint"]
        )?,
        upserts: register_counter_vec!(
            "eventsync_upserts_total",
            "Event upserts by outcome",
            &["outcome"]
        )?,
        records_dropped: register_counter_vec!(
            "eventsync_records_dropped_total",
            "Raw records dropped during normalization",
            &["reason"]
        )?,
        sync_duration: register_histogram!(
            "eventsync_sync_duration_seconds",
            "Wall-clock duration of a full sync run in seconds",
            vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0]
        )?,
    };

    if SYNC_METRICS.set(metrics).is_ok() {
        tracing::info!("Prometheus metrics initialized");
    }
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SYNC_METRICS.get().is_some()
}

pub fn record_fetch_attempt(endpoint: &str, outcome: &str) {
    if let Some(m) = SYNC_METRICS.get() {
        m.fetch_attempts.with_label_values(&[endpoint, outcome]).inc();
    }
}

pub fn record_cache_hit(endpoint: &str) {
    if let Some(m) = SYNC_METRICS.get() {
        m.cache_hits.with_label_values(&[endpoint]).inc();
    }
}

pub fn record_upsert(outcome: &str) {
    if let Some(m) = SYNC_METRICS.get() {
        m.upserts.with_label_values(&[outcome]).inc();
    }
}

pub fn record_dropped(reason: &str) {
    if let Some(m) = SYNC_METRICS.get() {
        m.records_dropped.with_label_values(&[reason]).inc();
    }
}

pub fn observe_sync_duration(seconds: f64) {
    if let Some(m) = SYNC_METRICS.get() {
        m.sync_duration.observe(seconds);
    }
}

/// Render every registered metric in the Prometheus text exposition format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
