//! Health endpoints
//!
//! `GET /health` is a liveness check. `GET /health/detailed` also checks the
//! upstream DICOMweb service and answers 503 when it cannot be reached.

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::Result;

/// Reachability of one dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub service: String,
    pub address: String,
    pub connected: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Shared state behind the health routes
#[derive(Clone)]
pub struct HealthState {
    pub service_name: String,
    pub start_time: Instant,
    upstream: Option<String>,
    client: HealthClient,
}

impl HealthState {
    pub fn new(service_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            service_name: service_name.into(),
            start_time: Instant::now(),
            upstream: None,
            client: HealthClient::new(Duration::from_secs(5))?,
        })
    }

    /// Check `url` from `/health/detailed`
    pub fn with_upstream(mut self, url: impl Into<String>) -> Self {
        self.upstream = Some(url.into());
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub async fn check_connections(&self) -> Vec<ConnectionStatus> {
        match &self.upstream {
            Some(url) => vec![self.client.check_http("upstream", url).await],
            None => Vec::new(),
        }
    }
}

/// Liveness
pub async fn simple_health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn health_handler(State(state): State<Arc<HealthState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
    }))
}

pub async fn detailed_health_handler(
    State(state): State<Arc<HealthState>>,
) -> (StatusCode, Json<Value>) {
    let connections = state.check_connections().await;

    let all_healthy = connections.iter().all(|c| c.connected);
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let health = json!({
        "status": if all_healthy { "healthy" } else { "degraded" },
        "service": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "connections": connections,
    });

    (status_code, Json(health))
}

pub fn health_routes(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/detailed", get(detailed_health_handler))
        .with_state(state)
}

/// Reusable HTTP health checker
#[derive(Clone)]
pub struct HealthClient {
    client: reqwest::Client,
}

impl HealthClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Any response below 500 counts as reachable; a bare base URL
    /// commonly answers 404.
    pub async fn check_http(&self, service_name: &str, url: &str) -> ConnectionStatus {
        let start = Instant::now();

        let (connected, error) = match self.client.get(url).send().await {
            Ok(response) if response.status().is_server_error() => {
                (false, Some(format!("HTTP {}", response.status())))
            }
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };

        ConnectionStatus {
            service: service_name.to_string(),
            address: url.to_string(),
            connected,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error,
        }
    }
}
