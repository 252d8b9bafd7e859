//! Metadata pipeline error types

use thiserror::Error;

/// Errors raised while fetching or aggregating study metadata
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// Transport failure, timeout, or a non-2xx status other than 404
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Body was not JSON, or not a JSON array
    #[error("Malformed upstream response: {0}")]
    UpstreamMalformedResponse(String),

    /// Upstream answered 404
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to serialize metadata: {0}")]
    SerializationFailure(String),

    /// One series could not be listed; recovered as zero instances
    #[error("Series {series_uid} failed: {reason}")]
    PartialSeriesFailure { series_uid: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    pub fn partial(series_uid: impl Into<String>, source: &MetadataError) -> Self {
        Self::PartialSeriesFailure {
            series_uid: series_uid.into(),
            reason: source.to_string(),
        }
    }

    /// Only unavailability is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }

    /// HTTP status this error surfaces as
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::UpstreamUnavailable(_) | Self::UpstreamMalformedResponse(_) => 502,
            Self::SerializationFailure(_)
            | Self::PartialSeriesFailure { .. }
            | Self::Internal(_) => 500,
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::UpstreamMalformedResponse(_) => "upstream_malformed",
            Self::NotFound(_) => "not_found",
            Self::SerializationFailure(_) => "serialization",
            Self::PartialSeriesFailure { .. } => "partial_series",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for MetadataError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailure(err.to_string())
    }
}

impl From<common::Error> for MetadataError {
    fn from(err: common::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
