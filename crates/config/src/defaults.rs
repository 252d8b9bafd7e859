pub fn default_proxy_name() -> String {
    "dicomweb-proxy".to_string()
}

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_http_port() -> u16 {
    8080
}

pub fn default_request_timeout() -> u64 {
    60
}

pub fn default_upstream_base_url() -> String {
    "http://localhost:8090/medical-imaging".to_string()
}

pub fn default_upstream_timeout() -> u64 {
    30
}

pub fn default_max_concurrent_series() -> usize {
    10
}

pub fn default_max_retries() -> u32 {
    3
}

pub fn default_initial_backoff_ms() -> u64 {
    1000
}

pub fn default_max_backoff_ms() -> u64 {
    5000
}

/// Matches Google Cloud Healthcare API bulk data URLs, capturing the part
/// after the last `/dicomWeb/` segment
pub fn default_upstream_pattern() -> String {
    r"(?s)^.*healthcare\.googleapis\.com.*/dicomWeb/(?P<path>.+)$".to_string()
}

pub fn default_local_base_url() -> String {
    "http://localhost:8080/dicomweb".to_string()
}

pub fn default_max_depth() -> usize {
    256
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}

pub fn default_metrics_port() -> u16 {
    9090
}
