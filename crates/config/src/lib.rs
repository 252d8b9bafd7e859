use serde::{Deserialize, Serialize};

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

/// Root of the proxy configuration file
///
/// Every section is optional; missing sections and fields fall back to the
/// values in [`defaults`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub proxy: ProxyInfo,
    #[serde(default)]
    pub server: ListenConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub rewrite: RewriteConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyInfo {
    #[serde(default = "default_proxy_name")]
    pub name: String,
}

impl Default for ProxyInfo {
    fn default() -> Self {
        Self {
            name: default_proxy_name(),
        }
    }
}

/// Inbound HTTP listener
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Upper bound on handling one inbound request; 0 disables the timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Upstream DICOMweb service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Base URL that `/studies/...` paths are appended to
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            timeout_seconds: default_upstream_timeout(),
        }
    }
}

/// Study metadata aggregation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregationConfig {
    /// Ceiling on concurrent per-series instance fetches
    #[serde(default = "default_max_concurrent_series")]
    pub max_concurrent_series: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_series: default_max_concurrent_series(),
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff for the series-list fetch
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Bulk data locator rewrite rule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RewriteConfig {
    /// Regex matched against `BulkDataURI` values; must capture `path`
    #[serde(default = "default_upstream_pattern")]
    pub upstream_pattern: String,
    /// Base that the captured path is appended to
    #[serde(default = "default_local_base_url")]
    pub local_base_url: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            upstream_pattern: default_upstream_pattern(),
            local_base_url: default_local_base_url(),
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// pretty, json or compact
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub metrics_enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
        }
    }
}
