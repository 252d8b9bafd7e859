//! Axum routes for the proxy surface

use axum::middleware;
use axum::routing::get;
use axum::Router;
use observability::ServerMetrics;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api::forwarding::{get_bulk_data, intercept_provider_url, list_studies};
use crate::api::handlers::{get_study_metadata, MetadataApiState};
use crate::api::middleware::{cross_origin_isolation, record_metrics};

/// DICOMweb routes with cross-origin isolation headers and permissive CORS
pub fn create_router(state: Arc<MetadataApiState>) -> Router {
    Router::new()
        .route("/dicomweb/studies", get(list_studies))
        .route("/dicomweb/studies/:study_id/metadata", get(get_study_metadata))
        .route(
            "/dicomweb/studies/:study_id/series/:series_id/instances/:instance_id/bulkdata/*rest",
            get(get_bulk_data),
        )
        .route(
            "/v1/projects/:project/locations/:location/datasets/:dataset/dicomStores/:store/dicomWeb/*rest",
            get(intercept_provider_url),
        )
        .with_state(state)
        .layer(middleware::from_fn(cross_origin_isolation))
        .layer(CorsLayer::permissive())
}

/// Tracing, request ids, an optional request timeout and optional metrics
/// around a finished router
pub fn with_http_layers(
    router: Router,
    request_timeout: Option<Duration>,
    metrics: Option<Arc<ServerMetrics>>,
) -> Router {
    let mut router = router;

    if let Some(metrics) = metrics {
        router = router.layer(middleware::from_fn_with_state(metrics, record_metrics));
    }
    if let Some(timeout) = request_timeout {
        router = router.layer(TimeoutLayer::new(timeout));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::forwarding::DicomWebForwarder;
    use crate::clients::dicomweb::{DicomWebClient, MockDicomWebClient};
    use crate::error::MetadataError;
    use crate::pipeline::StudyMetadataAggregator;
    use crate::rewrite::BulkDataRewriter;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use common::{tags, AttributeDocument};
    use serde_json::Value;
    use tower::ServiceExt;

    const STUDY: &str = "1.2.3";

    fn router_with(client: MockDicomWebClient) -> Router {
        let client: Arc<dyn DicomWebClient> = Arc::new(client);
        let state = Arc::new(MetadataApiState {
            aggregator: Arc::new(StudyMetadataAggregator::new(client, BulkDataRewriter::default())),
            forwarder: DicomWebForwarder::new("http://127.0.0.1:9/unused", Duration::from_secs(1))
                .unwrap(),
        });
        create_router(state)
    }

    fn two_by_three() -> MockDicomWebClient {
        let mut mock = MockDicomWebClient::new().with_series(
            STUDY,
            vec![
                AttributeDocument::new().with_value(tags::SERIES_INSTANCE_UID, "UI", "1.2.3.1"),
                AttributeDocument::new().with_value(tags::SERIES_INSTANCE_UID, "UI", "1.2.3.2"),
            ],
        );
        for series in ["1.2.3.1", "1.2.3.2"] {
            let instances = (1..=3)
                .map(|i| {
                    AttributeDocument::new().with_value(
                        tags::SOP_INSTANCE_UID,
                        "UI",
                        format!("{}.{}", series, i),
                    )
                })
                .collect();
            mock = mock.with_instances(STUDY, series, instances);
        }
        mock
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = router
            .oneshot(
                Request::get(uri)
                    .header("origin", "http://viewer.local")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, headers, value)
    }

    #[tokio::test]
    async fn test_metadata_returns_all_instances() {
        let (status, headers, body) =
            get(router_with(two_by_three()), "/dicomweb/studies/1.2.3/metadata").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "application/dicom+json");
        assert_eq!(headers["cross-origin-resource-policy"], "cross-origin");
        assert_eq!(headers["cross-origin-embedder-policy"], "require-corp");
        assert_eq!(headers["cross-origin-opener-policy"], "same-origin");
        assert_eq!(headers["access-control-allow-origin"], "*");

        let docs = body.as_array().unwrap();
        assert_eq!(docs.len(), 6);
        assert!(docs.iter().all(|d| d.get("0020000E").is_some()));
    }

    #[tokio::test]
    async fn test_empty_study_returns_empty_array() {
        let mock = MockDicomWebClient::new().with_series(STUDY, Vec::new());
        let (status, _, body) = get(router_with(mock), "/dicomweb/studies/1.2.3/metadata").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_missing_study_is_404() {
        let (status, headers, body) =
            get(router_with(MockDicomWebClient::new()), "/dicomweb/studies/9.9/metadata").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(headers["cross-origin-opener-policy"], "same-origin");
        assert!(body["error"].as_str().unwrap().contains("9.9"));
    }

    #[tokio::test]
    async fn test_malformed_upstream_is_502() {
        let mock = MockDicomWebClient::new().fail_series_always(
            MetadataError::UpstreamMalformedResponse("expected a JSON array, got object".into()),
        );
        let (status, _, body) = get(router_with(mock), "/dicomweb/studies/1.2.3/metadata").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().starts_with("Malformed upstream response"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_upstream_is_502_after_retries() {
        let mock = MockDicomWebClient::new()
            .fail_series_always(MetadataError::UpstreamUnavailable("HTTP 503".into()));
        let (status, _, body) = get(router_with(mock), "/dicomweb/studies/1.2.3/metadata").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_with_http_layers_sets_request_id() {
        let router = with_http_layers(
            router_with(two_by_three()),
            Some(Duration::from_secs(30)),
            Some(Arc::new(ServerMetrics::new("test"))),
        );
        let (status, headers, _) = get(router, "/dicomweb/studies/1.2.3/metadata").await;

        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_bad_study_search_query_is_json_400() {
        let (status, headers, body) = get(
            router_with(MockDicomWebClient::new()),
            "/dicomweb/studies?limit=abc",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(headers["content-type"], "application/json");
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to deserialize query string"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (status, _, _) = get(router_with(MockDicomWebClient::new()), "/dicomweb/unknown").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
