//! HTTP surface

pub mod forwarding;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

pub use forwarding::DicomWebForwarder;
pub use handlers::MetadataApiState;
pub use routes::{create_router, with_http_layers};
