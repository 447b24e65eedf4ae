//! Prometheus metrics for the scheduling service
//!
//! Call `init_metrics()` once at startup. If registration fails, metric
//! operations become no-ops and the service runs without them.

use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct ServiceMetrics {
    http_requests: CounterVec,
    http_duration: HistogramVec,
    rate_limited: CounterVec,
    db_pool_size: Gauge,
    db_pool_in_use: Gauge,
    db_pool_waiting: Gauge,
    cache_entries: GaugeVec,
    cache_hit_rate: GaugeVec,
    solver_runs: CounterVec,
    solver_duration: HistogramVec,
    ws_clients: Gauge,
    ws_dropped: Gauge,
}

static METRICS: OnceLock<ServiceMetrics> = OnceLock::new();
static INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Register all metrics; safe to call more than once
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    INIT_ATTEMPTED.set(true).ok();

    let metrics = ServiceMetrics {
        http_requests: register_counter_vec!(
            "rota_http_requests_total",
            "Total HTTP requests by route and status",
            &["route", "status"]
        )?,
        http_duration: register_histogram_vec!(
            "rota_http_request_duration_seconds",
            "HTTP request duration in seconds",
            &["route"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )?,
        rate_limited: register_counter_vec!(
            "rota_rate_limited_total",
            "Requests rejected by the rate limiter, by endpoint class",
            &["class"]
        )?,
        db_pool_size: register_gauge!("rota_db_pool_size", "Connection pool size")?,
        db_pool_in_use: register_gauge!("rota_db_pool_in_use", "Connections checked out")?,
        db_pool_waiting: register_gauge!("rota_db_pool_waiting", "Tasks waiting for a connection")?,
        cache_entries: register_gauge_vec!(
            "rota_cache_entries",
            "Entries per cache family",
            &["family"]
        )?,
        cache_hit_rate: register_gauge_vec!(
            "rota_cache_hit_rate",
            "Hit rate per cache family",
            &["family"]
        )?,
        solver_runs: register_counter_vec!(
            "rota_solver_runs_total",
            "Solver invocations by result status",
            &["status"]
        )?,
        solver_duration: register_histogram_vec!(
            "rota_solver_duration_seconds",
            "Solver wall time in seconds",
            &["status"],
            vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
        )?,
        ws_clients: register_gauge!("rota_ws_subscriptions", "Active topic subscriptions")?,
        ws_dropped: register_gauge!("rota_ws_dropped_clients", "Clients dropped for backpressure")?,
    };

    METRICS
        .set(metrics)
        .map_err(|_| "metrics already initialized")?;
    Ok(())
}

// ============================================================================
// Recorders (no-ops when uninitialized)
// ============================================================================

pub fn record_http_request(route: &str, status: u16, duration_secs: f64) {
    if let Some(m) = METRICS.get() {
        m.http_requests
            .with_label_values(&[route, &status.to_string()])
            .inc();
        m.http_duration
            .with_label_values(&[route])
            .observe(duration_secs);
    }
}

pub fn record_rate_limited(class: &str) {
    if let Some(m) = METRICS.get() {
        m.rate_limited.with_label_values(&[class]).inc();
    }
}

pub fn set_pool_status(size: usize, in_use: usize, waiting: usize) {
    if let Some(m) = METRICS.get() {
        m.db_pool_size.set(size as f64);
        m.db_pool_in_use.set(in_use as f64);
        m.db_pool_waiting.set(waiting as f64);
    }
}

pub fn set_cache_family(family: &str, entries: usize, hit_rate: f64) {
    if let Some(m) = METRICS.get() {
        m.cache_entries.with_label_values(&[family]).set(entries as f64);
        m.cache_hit_rate.with_label_values(&[family]).set(hit_rate);
    }
}

pub fn record_solver_run(status: &str, duration_secs: f64) {
    if let Some(m) = METRICS.get() {
        m.solver_runs.with_label_values(&[status]).inc();
        m.solver_duration
            .with_label_values(&[status])
            .observe(duration_secs);
    }
}

pub fn set_ws_stats(subscriptions: usize, dropped: u64) {
    if let Some(m) = METRICS.get() {
        m.ws_clients.set(subscriptions as f64);
        m.ws_dropped.set(dropped as f64);
    }
}

/// Render the registry in Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_and_record() {
        init_metrics().unwrap();
        // Second init is a no-op
        init_metrics().unwrap();

        record_http_request("/api/health", 200, 0.001);
        record_rate_limited("auth");
        set_pool_status(20, 3, 0);
        set_cache_family("employee", 10, 0.9);
        record_solver_run("optimal", 0.5);
        set_ws_stats(2, 0);

        let text = gather();
        assert!(text.contains("rota_http_requests_total"));
        assert!(text.contains("rota_db_pool_size"));
        assert!(text.contains("rota_solver_runs_total"));
    }
}
