//! Upstream URL resolution
//!
//! The upstream DICOMweb base URL is resolved with the priority
//! ENV > CONFIG > DEFAULT, so deployments can repoint the proxy without
//! editing the configuration file.

/// Environment variable that overrides the configured upstream base URL
pub const UPSTREAM_URL_ENV: &str = "DICOMWEB_UPSTREAM_URL";

/// Resolve a single URL with priority: ENV > CONFIG > DEFAULT
///
/// # Arguments
/// * `env_var` - Environment variable name (e.g., "DICOMWEB_UPSTREAM_URL")
/// * `config_url` - URL from config file
/// * `default_url` - Default fallback URL
///
/// # Example
/// ```
/// let url = common::resolve_url(
///     "EXAMPLE_UPSTREAM_URL",
///     Some("http://imaging:8090/medical-imaging"),
///     "http://localhost:8090",
/// );
/// assert_eq!(url, "http://imaging:8090/medical-imaging");
/// ```
pub fn resolve_url(env_var: &str, config_url: Option<&str>, default_url: &str) -> String {
    if let Ok(url) = std::env::var(env_var) {
        if !url.trim().is_empty() {
            return normalize_url(&url);
        }
    }

    if let Some(url) = config_url {
        if !url.trim().is_empty() {
            return normalize_url(url);
        }
    }

    normalize_url(default_url)
}

/// Resolve with an explicit override (e.g. a command-line flag) taking
/// priority over ENV > CONFIG > DEFAULT
pub fn resolve_url_with_override(
    override_url: Option<&str>,
    env_var: &str,
    config_url: Option<&str>,
    default_url: &str,
) -> String {
    match override_url.filter(|url| !url.trim().is_empty()) {
        Some(url) => normalize_url(url),
        None => resolve_url(env_var, config_url, default_url),
    }
}

/// Normalize a URL by ensuring it has a scheme and no trailing slashes
pub fn normalize_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');

    if !url.starts_with("http://") && !url.starts_with("https://") {
        format!("http://{}", url)
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url_env_priority() {
        std::env::set_var("TEST_UPSTREAM_URL", "http://env-upstream:9000/dicom-web");

        let url = resolve_url(
            "TEST_UPSTREAM_URL",
            Some("http://config:8000"),
            "http://default:7000",
        );
        assert_eq!(url, "http://env-upstream:9000/dicom-web");

        std::env::remove_var("TEST_UPSTREAM_URL");
    }

    #[test]
    fn test_resolve_url_config_fallback() {
        let url = resolve_url("TEST_UPSTREAM_URL_2", Some("http://config:8000/"), "http://default:7000");
        assert_eq!(url, "http://config:8000");
    }

    #[test]
    fn test_resolve_url_blank_config_uses_default() {
        let url = resolve_url("TEST_UPSTREAM_URL_3", Some("  "), "http://default:7000");
        assert_eq!(url, "http://default:7000");
    }

    #[test]
    fn test_override_beats_env() {
        std::env::set_var("TEST_UPSTREAM_URL_4", "http://env-host:1");

        let url = resolve_url_with_override(
            Some("http://cli-host:2/"),
            "TEST_UPSTREAM_URL_4",
            Some("http://config:8000"),
            "http://default:7000",
        );
        assert_eq!(url, "http://cli-host:2");

        let url = resolve_url_with_override(
            None,
            "TEST_UPSTREAM_URL_4",
            Some("http://config:8000"),
            "http://default:7000",
        );
        assert_eq!(url, "http://env-host:1");

        std::env::remove_var("TEST_UPSTREAM_URL_4");
    }

    #[test]
    fn test_blank_override_falls_through() {
        let url = resolve_url_with_override(
            Some(" "),
            "TEST_UPSTREAM_URL_5",
            Some("http://config:8000"),
            "http://default:7000",
        );
        assert_eq!(url, "http://config:8000");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("localhost:8090"), "http://localhost:8090");
        assert_eq!(normalize_url("http://localhost:8090/medical-imaging/"), "http://localhost:8090/medical-imaging");
        assert_eq!(normalize_url("https://imaging.example.com"), "https://imaging.example.com");
    }
}
