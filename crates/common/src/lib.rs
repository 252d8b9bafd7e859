//! Common types and utilities for the DICOMweb proxy
//!
//! This crate provides the DICOM JSON data model shared by every other
//! crate in the workspace.
//!
//! # Modules
//!
//! - [`error`] - Common error types
//! - [`types`] - Attribute tags, attribute documents and the tag accessor
//! - [`resolver`] - Upstream URL resolution (OVERRIDE > ENV > CONFIG > DEFAULT)

pub mod error;
pub mod resolver;
pub mod types;

pub use error::{Error, Result};
pub use resolver::{normalize_url, resolve_url, resolve_url_with_override};
pub use types::{
    extract_value, first_value, json_kind, tags, AttributeDocument, AttributeTag, AttributeValue,
    BULK_DATA_URI, VALUE, VR,
};
