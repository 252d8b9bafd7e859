//! Study metadata aggregation
//!
//! One request fetches the study's series list (with retry), fans out to
//! list every series' instances under a concurrency ceiling, merges the
//! series attributes into each instance, and rewrites bulk data locators.
//! A series that fails is logged and contributes nothing.

use common::AttributeDocument;
use config::ProxyConfig;
use futures::stream::{self, StreamExt};
use observability::AggregationMetrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::clients::dicomweb::DicomWebClient;
use crate::error::{MetadataError, Result};
use crate::merge::merge_series_into_instance;
use crate::retry::RetryPolicy;
use crate::rewrite::BulkDataRewriter;

/// Default ceiling on concurrent instance listings
pub const DEFAULT_MAX_CONCURRENT_SERIES: usize = 10;

pub struct StudyMetadataAggregator {
    client: Arc<dyn DicomWebClient>,
    rewriter: BulkDataRewriter,
    retry: RetryPolicy,
    max_concurrent_series: usize,
    metrics: AggregationMetrics,
}

impl StudyMetadataAggregator {
    pub fn new(client: Arc<dyn DicomWebClient>, rewriter: BulkDataRewriter) -> Self {
        Self {
            client,
            rewriter,
            retry: RetryPolicy::default(),
            max_concurrent_series: DEFAULT_MAX_CONCURRENT_SERIES,
            metrics: AggregationMetrics::new(),
        }
    }

    pub fn from_config(client: Arc<dyn DicomWebClient>, config: &ProxyConfig) -> Result<Self> {
        let rewriter = BulkDataRewriter::from_config(&config.rewrite)?;
        Ok(Self::new(client, rewriter)
            .with_retry_policy(RetryPolicy::from_config(&config.aggregation.retry))
            .with_max_concurrent_series(config.aggregation.max_concurrent_series))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Values below 1 are raised to 1
    pub fn with_max_concurrent_series(mut self, limit: usize) -> Self {
        self.max_concurrent_series = limit.max(1);
        self
    }

    pub fn max_concurrent_series(&self) -> usize {
        self.max_concurrent_series
    }

    /// Every instance of the study, each carrying its series' attributes
    ///
    /// Instances of one series keep their upstream order; series appear in
    /// completion order.
    #[instrument(skip(self), fields(request_id = %Uuid::new_v4()))]
    pub async fn get_study_metadata(
        &self,
        study_id: &str,
        image_set_id: Option<&str>,
    ) -> Result<Vec<AttributeDocument>> {
        let started = Instant::now();
        let result = self.aggregate(study_id, image_set_id).await;

        let outcome = match &result {
            Ok(instances) => {
                info!(
                    instances = instances.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Study metadata aggregated"
                );
                "ok"
            }
            Err(e) => {
                warn!(error = %e, "Study metadata aggregation failed");
                e.kind()
            }
        };
        self.metrics.finished(outcome, started.elapsed());

        result
    }

    async fn aggregate(
        &self,
        study_id: &str,
        image_set_id: Option<&str>,
    ) -> Result<Vec<AttributeDocument>> {
        let client = self.client.as_ref();
        let metrics = &self.metrics;

        let series_list = self
            .retry
            .run(
                "list_series",
                move || client.list_series(study_id, image_set_id),
                |_, _| metrics.upstream_retry(),
            )
            .await?;

        if series_list.is_empty() {
            debug!("Study has no series");
            return Ok(Vec::new());
        }

        let total_series = series_list.len();
        let branches: Vec<(String, AttributeDocument)> = series_list
            .into_iter()
            .filter_map(|series| match series.series_instance_uid() {
                Some(uid) => Some((uid, series)),
                None => {
                    warn!("Skipping series without a Series Instance UID");
                    None
                }
            })
            .collect();

        debug!(
            series = total_series,
            usable = branches.len(),
            limit = self.max_concurrent_series,
            "Fanning out instance listings"
        );

        let per_series: Vec<Vec<AttributeDocument>> = stream::iter(branches)
            .map(|(series_uid, series)| self.series_instances(study_id, series_uid, series))
            .buffer_unordered(self.max_concurrent_series)
            .collect()
            .await;

        let instances: Vec<AttributeDocument> = per_series.into_iter().flatten().collect();
        self.metrics.instances_aggregated(instances.len());
        Ok(instances)
    }

    /// Merged and rewritten instances of one series; empty on failure
    async fn series_instances(
        &self,
        study_id: &str,
        series_uid: String,
        series: AttributeDocument,
    ) -> Vec<AttributeDocument> {
        let instances = match self.client.list_instances(study_id, &series_uid).await {
            Ok(instances) => instances,
            Err(err) => {
                let failure = MetadataError::partial(&series_uid, &err);
                warn!(series_uid = %series_uid, error = %failure, "Series skipped");
                self.metrics.series_failed();
                return Vec::new();
            }
        };

        self.metrics.series_fetched();
        if instances.is_empty() {
            debug!(series_uid = %series_uid, "Series has no instances");
        }

        instances
            .into_iter()
            .map(|instance| {
                let mut merged = merge_series_into_instance(&series, instance);
                let rewritten = self.rewriter.rewrite_document(&mut merged);
                debug!(
                    series_uid = %series_uid,
                    sop_instance_uid = merged.sop_instance_uid().as_deref().unwrap_or("<none>"),
                    frames = merged.number_of_frames().unwrap_or(1),
                    multiframe = merged.is_multiframe(),
                    rewritten,
                    "Instance merged"
                );
                merged
            })
            .collect()
    }
}
