//! Common error types for the DICOMweb proxy

use thiserror::Error;

/// Common error type used across the proxy crates
#[derive(Error, Debug)]
pub enum Error {
    /// An attribute tag was not 8 hexadecimal digits
    #[error("Invalid attribute tag: {0}")]
    InvalidTag(String),

    /// A JSON value had the wrong shape for an attribute document
    #[error("Invalid attribute document: {0}")]
    InvalidDocument(String),
}

/// Result type alias using the common Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid tag error
    pub fn invalid_tag(msg: impl Into<String>) -> Self {
        Self::InvalidTag(msg.into())
    }

    /// Create an invalid document error
    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }
}
