//! Prometheus metrics
//!
//! Metric handles are created through the `metrics` facade; without an
//! installed recorder they are no-ops, so handlers and tests can record
//! freely.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Install the Prometheus recorder and serve `/metrics` on `port`
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

/// Metrics for one HTTP surface
///
/// * `http_requests_total{server, route, status}`
/// * `http_request_duration_seconds{server, route}`
/// * `http_requests_in_flight{server}`
#[derive(Clone)]
pub struct ServerMetrics {
    in_flight: Gauge,
    server_name: String,
}

impl ServerMetrics {
    pub fn new(server_name: &str) -> Self {
        let name = server_name.to_string();
        Self {
            in_flight: gauge!("http_requests_in_flight", "server" => name.clone()),
            server_name: name,
        }
    }

    /// Record a completed request against its matched route
    pub fn record_request(&self, route: &str, duration: Duration, status_code: u16) {
        counter!(
            "http_requests_total",
            "server" => self.server_name.clone(),
            "route" => route.to_string(),
            "status" => status_code.to_string()
        )
        .increment(1);
        histogram!(
            "http_request_duration_seconds",
            "server" => self.server_name.clone(),
            "route" => route.to_string()
        )
        .record(duration.as_secs_f64());
    }

    pub fn request_started(&self) {
        self.in_flight.increment(1.0);
    }

    pub fn request_finished(&self) {
        self.in_flight.decrement(1.0);
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

/// Records one request on drop
///
/// Tracks the in-flight gauge for its lifetime. The status defaults to 500
/// so a request abandoned mid-flight is not counted as a success.
///
/// ```ignore
/// let mut guard = RequestMetricsGuard::new(&metrics, "/dicomweb/studies");
/// let response = next.run(request).await;
/// guard.set_status(response.status().as_u16());
/// ```
pub struct RequestMetricsGuard<'a> {
    metrics: &'a ServerMetrics,
    route: String,
    start: Instant,
    status_code: u16,
}

impl<'a> RequestMetricsGuard<'a> {
    pub fn new(metrics: &'a ServerMetrics, route: impl Into<String>) -> Self {
        metrics.request_started();
        Self {
            metrics,
            route: route.into(),
            start: Instant::now(),
            status_code: 500,
        }
    }

    pub fn set_status(&mut self, code: u16) {
        self.status_code = code;
    }
}

impl Drop for RequestMetricsGuard<'_> {
    fn drop(&mut self) {
        self.metrics.request_finished();
        self.metrics
            .record_request(&self.route, self.start.elapsed(), self.status_code);
    }
}

/// Metrics for the study metadata aggregation pipeline
///
/// * `aggregation_requests_total{outcome}`
/// * `aggregation_series_fetched_total`
/// * `aggregation_series_failed_total`
/// * `aggregation_instances_total`
/// * `aggregation_upstream_retries_total`
/// * `aggregation_duration_seconds`
#[derive(Clone)]
pub struct AggregationMetrics {
    series_fetched: Counter,
    series_failed: Counter,
    instances: Counter,
    retries: Counter,
    duration: Histogram,
}

impl AggregationMetrics {
    pub fn new() -> Self {
        Self {
            series_fetched: counter!("aggregation_series_fetched_total"),
            series_failed: counter!("aggregation_series_failed_total"),
            instances: counter!("aggregation_instances_total"),
            retries: counter!("aggregation_upstream_retries_total"),
            duration: histogram!("aggregation_duration_seconds"),
        }
    }

    pub fn series_fetched(&self) {
        self.series_fetched.increment(1);
    }

    /// A series whose instance list could not be fetched and was skipped
    pub fn series_failed(&self) {
        self.series_failed.increment(1);
    }

    pub fn instances_aggregated(&self, count: usize) {
        self.instances.increment(count as u64);
    }

    pub fn upstream_retry(&self) {
        self.retries.increment(1);
    }

    /// Record a finished aggregation; `outcome` is `ok` or an error kind
    pub fn finished(&self, outcome: &'static str, duration: Duration) {
        counter!("aggregation_requests_total", "outcome" => outcome).increment(1);
        self.duration.record(duration.as_secs_f64());
    }
}

impl Default for AggregationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
