use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Instant;

use crate::error::{MonitorError, Result};

lazy_static! {
    // Series requests
    pub static ref SERIES_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "monitor_series_requests_total",
        "Total number of derived series requests, by view",
        &["view"]
    ).unwrap();

    // Sample store
    pub static ref FETCH_DURATION: HistogramVec = register_histogram_vec!(
        "monitor_fetch_duration_seconds",
        "Time spent fetching raw samples, by backend",
        &["backend"],
        vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]
    ).unwrap();

    pub static ref FETCH_FAILURES: IntCounter = register_int_counter!(
        "monitor_fetch_failures_total",
        "Total number of failed sample fetches"
    ).unwrap();

    pub static ref SAMPLES_GENERATED: IntCounter = register_int_counter!(
        "monitor_samples_generated_total",
        "Total number of synthetic samples generated"
    ).unwrap();

    pub static ref SAMPLES_INGESTED: IntCounter = register_int_counter!(
        "monitor_samples_ingested_total",
        "Total number of samples written to the local store"
    ).unwrap();
}

/// Touches every static so the series show up before the first request.
pub fn init_metrics() {
    lazy_static::initialize(&SERIES_REQUESTS);
    lazy_static::initialize(&FETCH_DURATION);
    lazy_static::initialize(&FETCH_FAILURES);
    lazy_static::initialize(&SAMPLES_GENERATED);
    lazy_static::initialize(&SAMPLES_INGESTED);
}

pub fn record_series_request(view: &str) {
    SERIES_REQUESTS.with_label_values(&[view]).inc();
}

pub fn record_fetch_failure() {
    FETCH_FAILURES.inc();
}

pub fn record_generated(count: usize) {
    SAMPLES_GENERATED.inc_by(count as u64);
}

pub fn record_ingested(count: usize) {
    SAMPLES_INGESTED.inc_by(count as u64);
}

/// Observes fetch latency for one backend when dropped.
pub struct FetchTimer {
    backend: &'static str,
    start: Instant,
}

impl FetchTimer {
    pub fn new(backend: &'static str) -> Self {
        Self {
            backend,
            start: Instant::now(),
        }
    }
}

impl Drop for FetchTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        FETCH_DURATION
            .with_label_values(&[self.backend])
            .observe(duration);
    }
}

/// Renders the default registry in the prometheus text format.
pub fn export() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| MonitorError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| MonitorError::Internal(format!("Metrics are not valid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_registered_series() {
        init_metrics();
        record_series_request("processors-rps");
        {
            let _timer = FetchTimer::new("test");
        }

        let text = export().unwrap();
        assert!(text.contains("monitor_series_requests_total"));
        assert!(text.contains("monitor_fetch_duration_seconds"));
    }
}
