//! End-to-end: proxy router -> reqwest client -> axum upstream on an
//! ephemeral port

use axum::body::{to_bytes, Body};
use axum::extract::{Path, Query, RawQuery};
use axum::http::header::{ACCEPT, CONTENT_RANGE, RANGE};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metadata::api::{create_router, DicomWebForwarder, MetadataApiState};
use metadata::{
    BulkDataRewriter, DicomWebClient, HttpDicomWebClient, MetadataError, RetryPolicy,
    StudyMetadataAggregator,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

const PIXELS: &[u8] = b"0123456789";

fn series_doc(uid: &str) -> Value {
    json!({
        "0020000E": { "vr": "UI", "Value": [uid] },
        "00080060": { "vr": "CS", "Value": ["CT"] }
    })
}

fn instance_doc(study: &str, series: &str, n: u32) -> Value {
    let sop = format!("{}.{}", series, n);
    json!({
        "00080018": { "vr": "UI", "Value": [sop] },
        "7FE00010": {
            "vr": "OB",
            "BulkDataURI": format!(
                "https://healthcare.googleapis.com/v1/projects/p/locations/l/datasets/d/dicomStores/s/dicomWeb/studies/{}/series/{}/instances/{}/bulkdata/7FE00010",
                study, series, sop
            )
        }
    })
}

async fn upstream_series(
    Path(study): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if headers.get(ACCEPT).map(|v| v.as_bytes()) != Some(b"application/dicom+json".as_slice()) {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }

    match study.as_str() {
        "1" if query.get("imageSetId").map(String::as_str) == Some("set-a") => {
            Json(json!([series_doc("1.1")])).into_response()
        }
        "1" => Json(json!([series_doc("1.1"), series_doc("1.2")])).into_response(),
        "partial" => Json(json!([series_doc("2.1"), series_doc("2.2")])).into_response(),
        "empty" => "null".into_response(),
        "broken" => Json(json!({ "not": "an array" })).into_response(),
        "down" => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn upstream_instances(Path((study, series)): Path<(String, String)>) -> Response {
    match series.as_str() {
        "1.1" => Json(json!([instance_doc(&study, "1.1", 1), instance_doc(&study, "1.1", 2)]))
            .into_response(),
        "1.2" | "2.2" => Json(json!([instance_doc(&study, &series, 1)])).into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn upstream_bulk_data(
    Path((study, _series, _instance, _rest)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if study == "missing" {
        return StatusCode::NOT_FOUND.into_response();
    }

    match headers.get(RANGE).and_then(|v| v.to_str().ok()) {
        Some("bytes=2-5") => (
            StatusCode::PARTIAL_CONTENT,
            [(CONTENT_RANGE, "bytes 2-5/10")],
            PIXELS[2..6].to_vec(),
        )
            .into_response(),
        _ => PIXELS.into_response(),
    }
}

async fn upstream_studies(RawQuery(query): RawQuery) -> Json<Value> {
    Json(json!([{ "query": query }]))
}

/// Base URL of a fake upstream
async fn spawn_upstream() -> String {
    let app = Router::new()
        .route("/dicom-web/studies", get(upstream_studies))
        .route("/dicom-web/studies/:study/series", get(upstream_series))
        .route(
            "/dicom-web/studies/:study/series/:series/instances",
            get(upstream_instances),
        )
        .route(
            "/dicom-web/studies/:study/series/:series/instances/:instance/bulkdata/*rest",
            get(upstream_bulk_data),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/dicom-web", addr)
}

fn proxy(base_url: &str, retry: RetryPolicy) -> Router {
    let client: Arc<dyn DicomWebClient> =
        Arc::new(HttpDicomWebClient::new(base_url, Duration::from_secs(5)).unwrap());
    let aggregator =
        StudyMetadataAggregator::new(client, BulkDataRewriter::default()).with_retry_policy(retry);

    create_router(Arc::new(MetadataApiState {
        aggregator: Arc::new(aggregator),
        forwarder: DicomWebForwarder::new(base_url, Duration::from_secs(5)).unwrap(),
    }))
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
    let (status, _, body) = send(router, Request::get(uri).body(Body::empty()).unwrap()).await;
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_metadata_aggregated_from_upstream() {
    let base = spawn_upstream().await;

    let (status, body) = get_json(proxy(&base, RetryPolicy::none()), "/dicomweb/studies/1/metadata").await;

    assert_eq!(status, StatusCode::OK);
    let docs = body.as_array().unwrap();
    assert_eq!(docs.len(), 3);
    for doc in docs {
        assert_eq!(doc["00080060"]["Value"][0], "CT");
        let uri = doc["7FE00010"]["BulkDataURI"].as_str().unwrap();
        assert!(uri.starts_with("http://localhost:8080/dicomweb/studies/1/series/"), "{}", uri);
    }
}

#[tokio::test]
async fn test_image_set_id_scopes_series() {
    let base = spawn_upstream().await;

    let (status, body) = get_json(
        proxy(&base, RetryPolicy::none()),
        "/dicomweb/studies/1/metadata?imageSetId=set-a",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failing_series_degrades_to_partial_result() {
    let base = spawn_upstream().await;

    let (status, body) =
        get_json(proxy(&base, RetryPolicy::none()), "/dicomweb/studies/partial/metadata").await;

    assert_eq!(status, StatusCode::OK);
    let docs = body.as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["0020000E"]["Value"][0], "2.2");
}

#[tokio::test]
async fn test_upstream_error_mapping() {
    let base = spawn_upstream().await;
    let router = proxy(&base, RetryPolicy::none());

    let (status, body) = get_json(router.clone(), "/dicomweb/studies/empty/metadata").await;
    assert_eq!((status, body), (StatusCode::OK, json!([])));

    let (status, body) = get_json(router.clone(), "/dicomweb/studies/nope/metadata").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = get_json(router.clone(), "/dicomweb/studies/broken/metadata").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, _) = get_json(router, "/dicomweb/studies/down/metadata").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_http_client_errors() {
    let base = spawn_upstream().await;
    let client = HttpDicomWebClient::new(&base, Duration::from_secs(5)).unwrap();

    assert!(matches!(
        client.list_series("down", None).await,
        Err(MetadataError::UpstreamUnavailable(_))
    ));
    assert!(matches!(
        client.list_series("broken", None).await,
        Err(MetadataError::UpstreamMalformedResponse(_))
    ));
    assert!(matches!(
        client.list_instances("1", "9.9").await,
        Err(MetadataError::UpstreamUnavailable(_))
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let client = HttpDicomWebClient::new(&dead, Duration::from_secs(5)).unwrap();
    assert!(matches!(
        client.list_series("1", None).await,
        Err(MetadataError::UpstreamUnavailable(_))
    ));
}

#[tokio::test]
async fn test_study_search_forwards_query_defaults() {
    let base = spawn_upstream().await;

    let (status, headers, body) = send(
        proxy(&base, RetryPolicy::none()),
        Request::get("/dicomweb/studies?limit=5&includefield=00100010")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/dicom+json");
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        body[0]["query"],
        "limit=5&offset=0&fuzzymatching=false&includefield=00100010"
    );
}

#[tokio::test]
async fn test_bulk_data_pass_through() {
    let base = spawn_upstream().await;
    let router = proxy(&base, RetryPolicy::none());

    let (status, headers, body) = send(
        router.clone(),
        Request::get("/dicomweb/studies/1/series/1.1/instances/1.1.1/bulkdata/7FE00010")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/octet-stream");
    assert_eq!(headers["cross-origin-embedder-policy"], "require-corp");
    assert_eq!(body, PIXELS);

    let (status, headers, body) = send(
        router.clone(),
        Request::get("/dicomweb/studies/1/series/1.1/instances/1.1.1/bulkdata/7FE00010")
            .header(RANGE, "bytes=2-5")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers[CONTENT_RANGE], "bytes 2-5/10");
    assert_eq!(body, b"2345");

    let (status, _, _) = send(
        router,
        Request::get("/dicomweb/studies/missing/series/1/instances/1/bulkdata/7FE00010")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_provider_url_is_served_from_upstream() {
    let base = spawn_upstream().await;

    let (status, headers, body) = send(
        proxy(&base, RetryPolicy::none()),
        Request::get(
            "/v1/projects/p/locations/l/datasets/d/dicomStores/s/dicomWeb/studies/1/series/1.1/instances/1.1.1/bulkdata/7FE00010",
        )
        .body(Body::empty())
        .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "application/octet-stream");
    assert_eq!(body, PIXELS);
}
