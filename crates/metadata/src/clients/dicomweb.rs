//! DICOMweb client - trait and implementations

use async_trait::async_trait;
use common::{json_kind, AttributeDocument};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::error::{MetadataError, Result};

/// Media type of DICOM JSON payloads
pub const DICOM_JSON: &str = "application/dicom+json";

/// Read-only access to an upstream DICOMweb service
#[async_trait]
pub trait DicomWebClient: Send + Sync {
    /// `GET {base}/studies/{study_id}/series[?imageSetId=]`
    async fn list_series(
        &self,
        study_id: &str,
        image_set_id: Option<&str>,
    ) -> Result<Vec<AttributeDocument>>;

    /// `GET {base}/studies/{study_id}/series/{series_uid}/instances`
    async fn list_instances(
        &self,
        study_id: &str,
        series_uid: &str,
    ) -> Result<Vec<AttributeDocument>>;
}

/// Decode a DICOM JSON list body
///
/// An empty or `null` body is an empty list. Anything other than a JSON
/// array is malformed; array elements that are not objects are dropped.
pub fn parse_document_list(body: &[u8], source: &str) -> Result<Vec<AttributeDocument>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_slice(body).map_err(|e| {
        MetadataError::UpstreamMalformedResponse(format!("{}: invalid JSON: {}", source, e))
    })?;

    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => {
            return Err(MetadataError::UpstreamMalformedResponse(format!(
                "{}: expected a JSON array, got {}",
                source,
                json_kind(&other)
            )))
        }
    };

    let total = items.len();
    let documents: Vec<AttributeDocument> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(AttributeDocument::from_map(map)),
            other => {
                warn!(source, kind = json_kind(&other), "Skipping non-object element in upstream list");
                None
            }
        })
        .collect();

    if documents.len() < total {
        warn!(source, skipped = total - documents.len(), "Upstream list contained non-object elements");
    }

    Ok(documents)
}

// ==================== Mock Implementation ====================

/// Scripted in-memory upstream for tests
///
/// Unknown studies answer `NotFound`; unknown series answer an empty list.
/// Tracks call counts, call times and the peak number of concurrent
/// instance fetches.
#[derive(Default)]
pub struct MockDicomWebClient {
    series: HashMap<String, Vec<AttributeDocument>>,
    instances: HashMap<(String, String), Vec<AttributeDocument>>,
    series_failures: Mutex<VecDeque<MetadataError>>,
    series_failure_always: Option<MetadataError>,
    instance_failures: HashMap<String, MetadataError>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    instance_calls: AtomicUsize,
    series_call_times: Mutex<Vec<Instant>>,
    image_set_ids: Mutex<Vec<Option<String>>>,
}

impl MockDicomWebClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, study_id: &str, series: Vec<AttributeDocument>) -> Self {
        self.series.insert(study_id.to_string(), series);
        self
    }

    pub fn with_instances(
        mut self,
        study_id: &str,
        series_uid: &str,
        instances: Vec<AttributeDocument>,
    ) -> Self {
        self.instances
            .insert((study_id.to_string(), series_uid.to_string()), instances);
        self
    }

    /// Fail the next `times` series-list calls with `error`
    pub fn fail_series_times(mut self, times: usize, error: MetadataError) -> Self {
        self.series_failures
            .get_mut()
            .extend(std::iter::repeat(error).take(times));
        self
    }

    pub fn fail_series_always(mut self, error: MetadataError) -> Self {
        self.series_failure_always = Some(error);
        self
    }

    /// Fail every instance listing of `series_uid`
    pub fn fail_instances(mut self, series_uid: &str, error: MetadataError) -> Self {
        self.instance_failures.insert(series_uid.to_string(), error);
        self
    }

    /// Delay applied to every instance listing
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn series_calls(&self) -> usize {
        self.series_call_times.lock().len()
    }

    pub fn series_call_times(&self) -> Vec<Instant> {
        self.series_call_times.lock().clone()
    }

    pub fn instance_calls(&self) -> usize {
        self.instance_calls.load(Ordering::SeqCst)
    }

    /// Peak number of instance listings in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Instance listings currently in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn image_set_ids(&self) -> Vec<Option<String>> {
        self.image_set_ids.lock().clone()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DicomWebClient for MockDicomWebClient {
    async fn list_series(
        &self,
        study_id: &str,
        image_set_id: Option<&str>,
    ) -> Result<Vec<AttributeDocument>> {
        self.series_call_times.lock().push(Instant::now());
        self.image_set_ids.lock().push(image_set_id.map(str::to_string));

        if let Some(error) = self.series_failures.lock().pop_front() {
            return Err(error);
        }
        if let Some(error) = &self.series_failure_always {
            return Err(error.clone());
        }

        self.series
            .get(study_id)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("study {}", study_id)))
    }

    async fn list_instances(
        &self,
        study_id: &str,
        series_uid: &str,
    ) -> Result<Vec<AttributeDocument>> {
        self.instance_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.instance_failures.get(series_uid) {
            return Err(error.clone());
        }

        Ok(self
            .instances
            .get(&(study_id.to_string(), series_uid.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

// ==================== HTTP Implementation ====================

#[cfg(feature = "client")]
pub mod http {
    use async_trait::async_trait;
    use common::AttributeDocument;
    use config::UpstreamConfig;
    use reqwest::header::ACCEPT;
    use reqwest::{Client, StatusCode, Url};
    use std::time::Duration;
    use tracing::debug;

    use super::{parse_document_list, DicomWebClient, DICOM_JSON};
    use crate::error::{MetadataError, Result};

    /// reqwest-backed DICOMweb client
    #[derive(Clone)]
    pub struct HttpDicomWebClient {
        client: Client,
        base_url: Url,
    }

    impl HttpDicomWebClient {
        pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
            let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
                MetadataError::Internal(format!("invalid upstream URL '{}': {}", base_url, e))
            })?;
            if base_url.cannot_be_a_base() {
                return Err(MetadataError::Internal(format!(
                    "upstream URL '{}' cannot be a base",
                    base_url
                )));
            }

            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| MetadataError::Internal(format!("failed to build HTTP client: {}", e)))?;

            Ok(Self { client, base_url })
        }

        pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
            Self::new(&config.base_url, Duration::from_secs(config.timeout_seconds))
        }

        pub fn base_url(&self) -> &Url {
            &self.base_url
        }

        /// Base URL with `segments` appended, each percent-encoded
        fn endpoint(&self, segments: &[&str]) -> Result<Url> {
            let mut url = self.base_url.clone();
            url.path_segments_mut()
                .map_err(|_| MetadataError::Internal("upstream URL cannot be a base".into()))?
                .pop_if_empty()
                .extend(segments);
            Ok(url)
        }

        async fn get_documents(
            &self,
            url: Url,
            query: &[(&str, &str)],
        ) -> Result<Vec<AttributeDocument>> {
            debug!(%url, "Fetching from upstream");

            let response = self
                .client
                .get(url.clone())
                .header(ACCEPT, DICOM_JSON)
                .query(query)
                .send()
                .await
                .map_err(|e| MetadataError::UpstreamUnavailable(format!("{}: {}", url, e)))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(MetadataError::NotFound(url.to_string()));
            }
            if !status.is_success() {
                return Err(MetadataError::UpstreamUnavailable(format!(
                    "{} returned {}",
                    url, status
                )));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| MetadataError::UpstreamUnavailable(format!("{}: {}", url, e)))?;

            parse_document_list(&body, url.as_str())
        }
    }

    #[async_trait]
    impl DicomWebClient for HttpDicomWebClient {
        async fn list_series(
            &self,
            study_id: &str,
            image_set_id: Option<&str>,
        ) -> Result<Vec<AttributeDocument>> {
            let url = self.endpoint(&["studies", study_id, "series"])?;
            match image_set_id {
                Some(id) => self.get_documents(url, &[("imageSetId", id)]).await,
                None => self.get_documents(url, &[]).await,
            }
        }

        async fn list_instances(
            &self,
            study_id: &str,
            series_uid: &str,
        ) -> Result<Vec<AttributeDocument>> {
            let url = self.endpoint(&["studies", study_id, "series", series_uid, "instances"])?;
            self.get_documents(url, &[]).await
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_endpoint_appends_encoded_segments() {
            let client =
                HttpDicomWebClient::new("http://imaging:8090/medical-imaging/", Duration::from_secs(1))
                    .unwrap();
            let url = client.endpoint(&["studies", "1.2/3", "series"]).unwrap();
            assert_eq!(
                url.as_str(),
                "http://imaging:8090/medical-imaging/studies/1.2%2F3/series"
            );
        }

        #[test]
        fn test_rejects_invalid_base_url() {
            assert!(HttpDicomWebClient::new("not a url", Duration::from_secs(1)).is_err());
        }
    }
}
