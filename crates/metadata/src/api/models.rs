//! API models

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

/// Body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

impl From<MetadataError> for ErrorResponse {
    fn from(err: MetadataError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

pub fn metadata_error(err: MetadataError) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err.into()))
}

/// Query of `GET /dicomweb/studies/{studyId}/metadata`
#[derive(Debug, Default, Deserialize)]
pub struct MetadataParams {
    #[serde(rename = "imageSetId")]
    pub image_set_id: Option<String>,
}

impl MetadataParams {
    /// Blank ids are treated as absent
    pub fn image_set_id(&self) -> Option<&str> {
        self.image_set_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Query of `GET /dicomweb/studies`
#[derive(Debug, Deserialize, Serialize)]
pub struct StudySearchParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub fuzzymatching: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub includefield: Option<String>,
}

fn default_limit() -> u32 {
    100
}

impl Default for StudySearchParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
            fuzzymatching: false,
            includefield: None,
        }
    }
}
