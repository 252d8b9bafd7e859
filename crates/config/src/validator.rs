use crate::*;
use regex::Regex;
use thiserror::Error;
use url::Url;

/// Concurrency above this is accepted but flagged
const HIGH_CONCURRENCY_WARNING: usize = 64;

const LOG_FORMATS: [&str; 3] = ["pretty", "json", "compact"];

#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    #[error("Upstream base URL is required")]
    MissingUpstreamUrl,

    #[error("Invalid upstream base URL '{url}': {message}")]
    InvalidUpstreamUrl { url: String, message: String },

    #[error("Invalid local base URL '{url}': {message}")]
    InvalidLocalBaseUrl { url: String, message: String },

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("Retry backoff: initial_backoff_ms ({initial}) must not exceed max_backoff_ms ({max})")]
    InvertedBackoff { initial: u64, max: u64 },

    #[error("Invalid rewrite pattern '{pattern}': {message}")]
    InvalidRewritePattern { pattern: String, message: String },

    #[error("Rewrite pattern '{0}' must define a named capture group 'path'")]
    MissingPathCapture(String),

    #[error("Invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidLogFormat(String),

    #[error("{field} port must not be 0")]
    InvalidPort { field: String },

    #[error("Environment variable placeholder left unresolved in {field}: {value}")]
    UnresolvedEnvVar { field: String, value: String },
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            defaults_applied: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_default(&mut self, field: &str, value: &str) {
        self.defaults_applied.push(DefaultApplied {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &ProxyConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_server(&config.server, &mut report);
    validate_upstream(&config.upstream, &mut report);
    validate_aggregation(&config.aggregation, &mut report);
    validate_rewrite(&config.rewrite, &mut report);
    validate_observability(&config.observability, &mut report);

    report
}

fn validate_server(server: &ListenConfig, report: &mut ValidationReport) {
    if server.http_port == 0 {
        report.add_error(ValidationError::InvalidPort {
            field: "server.http_port".to_string(),
        });
    }

    if server.request_timeout_seconds == 0 {
        report.add_warning(
            "server.request_timeout_seconds",
            "Inbound request timeout is disabled",
        );
    }
}

fn validate_upstream(upstream: &UpstreamConfig, report: &mut ValidationReport) {
    let base_url = upstream.base_url.trim();

    if base_url.is_empty() {
        report.add_error(ValidationError::MissingUpstreamUrl);
        return;
    }

    if has_unresolved_env_vars(base_url) {
        report.add_error(ValidationError::UnresolvedEnvVar {
            field: "upstream.base_url".to_string(),
            value: base_url.to_string(),
        });
        return;
    }

    match Url::parse(base_url) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                report.add_error(ValidationError::InvalidUpstreamUrl {
                    url: base_url.to_string(),
                    message: format!("unsupported scheme '{}'", url.scheme()),
                });
            } else if url.scheme() == "http" && !is_local_host(url.host_str()) {
                report.add_warning(
                    "upstream.base_url",
                    "Upstream is reached over plain http on a non-local host",
                );
            }
        }
        Err(e) => report.add_error(ValidationError::InvalidUpstreamUrl {
            url: base_url.to_string(),
            message: e.to_string(),
        }),
    }

    if upstream.timeout_seconds == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "upstream.timeout_seconds".to_string(),
        });
    }
}

fn is_local_host(host: Option<&str>) -> bool {
    matches!(host, Some("localhost") | Some("127.0.0.1") | Some("::1") | Some("[::1]"))
}

fn validate_aggregation(aggregation: &AggregationConfig, report: &mut ValidationReport) {
    if aggregation.max_concurrent_series == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "aggregation.max_concurrent_series".to_string(),
        });
    } else if aggregation.max_concurrent_series > HIGH_CONCURRENCY_WARNING {
        report.add_warning(
            "aggregation.max_concurrent_series",
            &format!(
                "{} concurrent series fetches may overwhelm the upstream service",
                aggregation.max_concurrent_series
            ),
        );
    }

    let retry = &aggregation.retry;
    if retry.max_retries == 0 {
        report.add_warning(
            "aggregation.retry.max_retries",
            "Series list fetch will not be retried",
        );
    }

    if retry.initial_backoff_ms == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "aggregation.retry.initial_backoff_ms".to_string(),
        });
    }

    if retry.initial_backoff_ms > retry.max_backoff_ms {
        report.add_error(ValidationError::InvertedBackoff {
            initial: retry.initial_backoff_ms,
            max: retry.max_backoff_ms,
        });
    }
}

fn validate_rewrite(rewrite: &RewriteConfig, report: &mut ValidationReport) {
    match Regex::new(&rewrite.upstream_pattern) {
        Ok(re) => {
            if !re.capture_names().any(|name| name == Some("path")) {
                report.add_error(ValidationError::MissingPathCapture(
                    rewrite.upstream_pattern.clone(),
                ));
            }
        }
        Err(e) => report.add_error(ValidationError::InvalidRewritePattern {
            pattern: rewrite.upstream_pattern.clone(),
            message: e.to_string(),
        }),
    }

    let local = rewrite.local_base_url.trim_end_matches('/');
    match Url::parse(local) {
        Ok(_) => {
            if !local.ends_with("/dicomweb") {
                report.add_warning(
                    "rewrite.local_base_url",
                    "Rewritten bulk data URIs will not point at this proxy's /dicomweb routes",
                );
            }
        }
        Err(e) => report.add_error(ValidationError::InvalidLocalBaseUrl {
            url: rewrite.local_base_url.clone(),
            message: e.to_string(),
        }),
    }

    if rewrite.max_depth == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "rewrite.max_depth".to_string(),
        });
    }
}

fn validate_observability(observability: &ObservabilityConfig, report: &mut ValidationReport) {
    let format = observability.log_format.to_lowercase();
    if !LOG_FORMATS.contains(&format.as_str()) {
        report.add_error(ValidationError::InvalidLogFormat(
            observability.log_format.clone(),
        ));
    }

    if observability.metrics_enabled && observability.metrics_port == 0 {
        report.add_error(ValidationError::InvalidPort {
            field: "observability.metrics_port".to_string(),
        });
    }

    if !observability.metrics_enabled {
        report.add_default("observability.metrics_enabled", "false");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let report = validate_config(&ProxyConfig::default());
        assert!(report.is_valid(), "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn test_missing_upstream_url() {
        let mut config = ProxyConfig::default();
        config.upstream.base_url = "  ".to_string();

        let report = validate_config(&config);
        assert!(matches!(report.errors[..], [ValidationError::MissingUpstreamUrl]));
    }

    #[test]
    fn test_unparseable_upstream_url() {
        let mut config = ProxyConfig::default();
        config.upstream.base_url = "not a url".to_string();

        let report = validate_config(&config);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidUpstreamUrl { .. })));
    }

    #[test]
    fn test_unresolved_env_var_in_upstream() {
        let mut config = ProxyConfig::default();
        config.upstream.base_url = "${UPSTREAM_NOT_SET}".to_string();

        let report = validate_config(&config);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnresolvedEnvVar { .. })));
    }

    #[test]
    fn test_plain_http_remote_upstream_warns() {
        let mut config = ProxyConfig::default();
        config.upstream.base_url = "http://imaging.example.com/dicom-web".to_string();

        let report = validate_config(&config);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.field == "upstream.base_url"));
    }

    #[test]
    fn test_zero_concurrency_is_error() {
        let mut config = ProxyConfig::default();
        config.aggregation.max_concurrent_series = 0;

        let report = validate_config(&config);
        assert!(!report.is_valid());
    }

    #[test]
    fn test_high_concurrency_warns() {
        let mut config = ProxyConfig::default();
        config.aggregation.max_concurrent_series = 200;

        let report = validate_config(&config);
        assert!(report.is_valid());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.field == "aggregation.max_concurrent_series"));
    }

    #[test]
    fn test_inverted_backoff_is_error() {
        let mut config = ProxyConfig::default();
        config.aggregation.retry.initial_backoff_ms = 10_000;
        config.aggregation.retry.max_backoff_ms = 5_000;

        let report = validate_config(&config);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvertedBackoff { initial: 10_000, max: 5_000 })));
    }

    #[test]
    fn test_rewrite_pattern_without_path_capture() {
        let mut config = ProxyConfig::default();
        config.rewrite.upstream_pattern = r"^.*/dicomWeb/(.+)$".to_string();

        let report = validate_config(&config);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::MissingPathCapture(_))));
    }

    #[test]
    fn test_rewrite_pattern_invalid_regex() {
        let mut config = ProxyConfig::default();
        config.rewrite.upstream_pattern = "(?P<path>".to_string();

        let report = validate_config(&config);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidRewritePattern { .. })));
    }

    #[test]
    fn test_unknown_log_format() {
        let mut config = ProxyConfig::default();
        config.observability.log_format = "xml".to_string();

        let report = validate_config(&config);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidLogFormat(_))));
    }

    #[test]
    fn test_local_base_without_dicomweb_suffix_warns() {
        let mut config = ProxyConfig::default();
        config.rewrite.local_base_url = "http://localhost:8080/bulk".to_string();

        let report = validate_config(&config);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.field == "rewrite.local_base_url"));
    }
}
