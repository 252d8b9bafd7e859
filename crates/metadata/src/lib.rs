//! DICOMweb study metadata aggregation
//!
//! Gathers every instance of a study from an upstream DICOMweb service,
//! folds series attributes into each instance, and points bulk data
//! locators back at this proxy.
//!
//! # Feature Flags
//!
//! - `client` - reqwest-backed upstream client
//! - `api` - axum routes, forwarding handlers and middleware (implies `client`)

pub mod clients;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod retry;
pub mod rewrite;

#[cfg(feature = "api")]
pub mod api;

pub use clients::dicomweb::{parse_document_list, DicomWebClient, MockDicomWebClient, DICOM_JSON};
pub use error::{MetadataError, Result};
pub use merge::merge_series_into_instance;
pub use pipeline::{StudyMetadataAggregator, DEFAULT_MAX_CONCURRENT_SERIES};
pub use retry::RetryPolicy;
pub use rewrite::BulkDataRewriter;

#[cfg(feature = "client")]
pub use clients::dicomweb::http::HttpDicomWebClient;

#[cfg(feature = "api")]
pub use api::{create_router, with_http_layers, DicomWebForwarder, MetadataApiState};
