//! Logging and metrics for the DICOMweb proxy
//!
//! - Structured logging via tracing, in pretty, json or compact form
//! - A Prometheus exporter plus metric sets for the HTTP surface and the
//!   study metadata aggregation pipeline
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("dicomweb-proxy", LogFormat::Json)?;
//! observability::init_metrics(9090)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{init_metrics, AggregationMetrics, RequestMetricsGuard, ServerMetrics};
