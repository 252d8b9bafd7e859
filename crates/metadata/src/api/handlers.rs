//! Study metadata handler

use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::info;

use crate::api::forwarding::DicomWebForwarder;
use crate::api::models::{metadata_error, ApiError, MetadataParams};
use crate::clients::dicomweb::DICOM_JSON;
use crate::error::MetadataError;
use crate::pipeline::StudyMetadataAggregator;

pub struct MetadataApiState {
    pub aggregator: Arc<StudyMetadataAggregator>,
    pub forwarder: DicomWebForwarder,
}

/// GET /dicomweb/studies/{studyId}/metadata
///
/// The body is serialized in full before anything is sent, so a client sees
/// either the whole array or an error object.
pub async fn get_study_metadata(
    State(state): State<Arc<MetadataApiState>>,
    Path(study_id): Path<String>,
    Query(params): Query<MetadataParams>,
) -> Result<Response, ApiError> {
    info!(%study_id, image_set_id = ?params.image_set_id(), "Fetching study metadata");

    let instances = state
        .aggregator
        .get_study_metadata(&study_id, params.image_set_id())
        .await
        .map_err(metadata_error)?;

    let body = serde_json::to_vec(&instances)
        .map_err(|e| metadata_error(MetadataError::from(e)))?;

    Ok(([(CONTENT_TYPE, HeaderValue::from_static(DICOM_JSON))], body).into_response())
}
