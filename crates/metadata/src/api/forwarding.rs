//! Pass-through handlers
//!
//! Study search, bulk data and provider-style bulk data URLs are forwarded
//! to the upstream without transforming the payload.

use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::header::{ACCEPT, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use config::UpstreamConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::api::handlers::MetadataApiState;
use crate::api::models::{api_error, ApiError, StudySearchParams};
use crate::clients::dicomweb::DICOM_JSON;
use crate::error::{MetadataError, Result};

const OCTET_STREAM: &str = "application/octet-stream";

/// HTTP client for forwarding requests to the upstream DICOMweb service
#[derive(Clone)]
pub struct DicomWebForwarder {
    client: reqwest::Client,
    base_url: String,
}

impl DicomWebForwarder {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetadataError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_seconds))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Forward a byte request, keeping `Range` semantics
    ///
    /// 200 and 206 pass through with `Content-Range`; 404 stays 404 and any
    /// other failure becomes 502.
    async fn forward_bytes(
        &self,
        path: &str,
        query: Option<&str>,
        request_headers: &HeaderMap,
    ) -> std::result::Result<Response, ApiError> {
        let mut url = self.url(path);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        debug!(%url, "Forwarding bulk data request");

        let mut request = self.client.get(&url);
        for name in [RANGE, ACCEPT] {
            if let Some(value) = request_headers.get(&name) {
                request = request.header(name, value.clone());
            }
        }

        let response = request.send().await.map_err(|e| {
            error!(%url, "Failed to forward request: {}", e);
            api_error(
                StatusCode::BAD_GATEWAY,
                format!("Failed to connect to upstream: {}", e),
            )
        })?;

        let response = check_upstream_status(response, &url).await?;
        let status = response.status();
        let content_range = response.headers().get(CONTENT_RANGE).cloned();

        let body = response.bytes().await.map_err(|e| {
            error!(%url, "Failed to read upstream body: {}", e);
            api_error(
                StatusCode::BAD_GATEWAY,
                format!("Failed to read upstream response: {}", e),
            )
        })?;

        let mut builder = Response::builder()
            .status(status)
            .header(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
        if let Some(range) = content_range {
            builder = builder.header(CONTENT_RANGE, range);
        }

        builder.body(Body::from(body)).map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to build response: {}", e),
            )
        })
    }
}

/// 404 is preserved, other non-2xx statuses become 502
async fn check_upstream_status(
    response: reqwest::Response,
    url: &str,
) -> std::result::Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!(%url, %status, "Upstream returned error: {}", body);

    if status == reqwest::StatusCode::NOT_FOUND {
        Err(api_error(StatusCode::NOT_FOUND, format!("Not found: {}", url)))
    } else {
        Err(api_error(
            StatusCode::BAD_GATEWAY,
            format!("Upstream returned {}: {}", status, body),
        ))
    }
}

// =============================================================================
// Forwarding Handlers
// =============================================================================

/// GET /dicomweb/studies - Search studies
pub async fn list_studies(
    State(state): State<Arc<MetadataApiState>>,
    query: std::result::Result<Query<StudySearchParams>, QueryRejection>,
) -> std::result::Result<Response, ApiError> {
    let Query(mut params) =
        query.map_err(|rejection| api_error(StatusCode::BAD_REQUEST, rejection.body_text()))?;
    params.includefield = params
        .includefield
        .filter(|field| !field.trim().is_empty());
    info!(
        limit = params.limit,
        offset = params.offset,
        fuzzymatching = params.fuzzymatching,
        includefield = ?params.includefield,
        "Fetching studies list"
    );

    let forwarder = &state.forwarder;
    let url = forwarder.url("studies");

    let response = forwarder
        .client
        .get(&url)
        .header(ACCEPT, DICOM_JSON)
        .query(&params)
        .send()
        .await
        .map_err(|e| {
            error!(%url, "Failed to forward request: {}", e);
            api_error(
                StatusCode::BAD_GATEWAY,
                format!("Failed to connect to upstream: {}", e),
            )
        })?;

    let response = check_upstream_status(response, &url).await?;
    let body = response.bytes().await.map_err(|e| {
        api_error(
            StatusCode::BAD_GATEWAY,
            format!("Failed to read upstream response: {}", e),
        )
    })?;

    Ok(([(CONTENT_TYPE, HeaderValue::from_static(DICOM_JSON))], body).into_response())
}

/// GET /dicomweb/studies/{study}/series/{series}/instances/{instance}/bulkdata/{*rest}
pub async fn get_bulk_data(
    State(state): State<Arc<MetadataApiState>>,
    Path((study_id, series_id, instance_id, rest)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> std::result::Result<Response, ApiError> {
    info!(%study_id, %series_id, %instance_id, bulkdata = %rest, "Fetching bulk data");

    let path = format!(
        "studies/{}/series/{}/instances/{}/bulkdata/{}",
        study_id,
        series_id,
        instance_id,
        rest.trim_start_matches('/')
    );
    state.forwarder.forward_bytes(&path, None, &headers).await
}

/// GET /v1/projects/{p}/locations/{l}/datasets/{d}/dicomStores/{s}/dicomWeb/{*rest}
///
/// Serves locators that still point at the provider layout from the
/// configured upstream.
pub async fn intercept_provider_url(
    State(state): State<Arc<MetadataApiState>>,
    Path((project, location, dataset, store, rest)): Path<(String, String, String, String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> std::result::Result<Response, ApiError> {
    info!(%project, %location, %dataset, %store, path = %rest, "Intercepting provider URL");

    state
        .forwarder
        .forward_bytes(&rest, query.as_deref(), &headers)
        .await
}
