//! Bulk data URI rewriting
//!
//! Upstream metadata embeds `BulkDataURI` locators that point at the
//! provider. [`BulkDataRewriter`] walks a JSON tree and points every
//! matching locator back at this proxy, leaving everything else untouched.

use common::{AttributeDocument, BULK_DATA_URI};
use config::RewriteConfig;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::error::{MetadataError, Result};

/// Name of the capture group holding the suffix to keep
pub const PATH_CAPTURE: &str = "path";

/// Rewrite rule: pattern with a `path` capture, plus the local base the
/// captured path is appended to
#[derive(Debug, Clone)]
pub struct BulkDataRewriter {
    pattern: Regex,
    local_base: String,
    max_depth: usize,
}

impl BulkDataRewriter {
    pub fn new(pattern: &str, local_base: &str, max_depth: usize) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| MetadataError::Internal(format!("invalid rewrite pattern: {}", e)))?;

        if !pattern.capture_names().any(|name| name == Some(PATH_CAPTURE)) {
            return Err(MetadataError::Internal(format!(
                "rewrite pattern must capture '{}'",
                PATH_CAPTURE
            )));
        }

        Ok(Self {
            pattern,
            local_base: local_base.trim_end_matches('/').to_string(),
            max_depth,
        })
    }

    pub fn from_config(config: &RewriteConfig) -> Result<Self> {
        Self::new(&config.upstream_pattern, &config.local_base_url, config.max_depth)
    }

    pub fn local_base(&self) -> &str {
        &self.local_base
    }

    /// Rewritten form of one locator, or `None` if it is left as is
    pub fn rewrite_uri(&self, uri: &str) -> Option<String> {
        // Already local; keeps the rewrite idempotent under broad patterns
        if uri.starts_with(&self.local_base) {
            return None;
        }

        let path = self.pattern.captures(uri)?.name(PATH_CAPTURE)?.as_str();
        Some(format!("{}/{}", self.local_base, path))
    }

    /// Rewrite every matching `BulkDataURI` in `tree`; returns how many
    /// locators changed
    pub fn rewrite_bulk_data_uris(&self, tree: &mut Value) -> usize {
        self.visit(tree, 0)
    }

    /// Owned form of [`rewrite_bulk_data_uris`](Self::rewrite_bulk_data_uris)
    pub fn rewritten(&self, mut tree: Value) -> Value {
        self.rewrite_bulk_data_uris(&mut tree);
        tree
    }

    pub fn rewrite_document(&self, doc: &mut AttributeDocument) -> usize {
        self.visit_object(doc.as_map_mut(), 0)
    }

    fn visit(&self, node: &mut Value, depth: usize) -> usize {
        match node {
            Value::Object(map) => self.visit_object(map, depth),
            Value::Array(items) => {
                if depth >= self.max_depth {
                    warn!(depth, "Bulk data rewrite depth limit reached, not descending");
                    return 0;
                }
                items.iter_mut().map(|item| self.visit(item, depth + 1)).sum()
            }
            _ => 0,
        }
    }

    fn visit_object(&self, map: &mut Map<String, Value>, depth: usize) -> usize {
        if depth >= self.max_depth {
            warn!(depth, "Bulk data rewrite depth limit reached, not descending");
            return 0;
        }

        let mut rewritten = 0;
        for (key, value) in map.iter_mut() {
            if key == BULK_DATA_URI {
                if let Value::String(uri) = value {
                    if let Some(local) = self.rewrite_uri(uri) {
                        trace!(from = %uri, to = %local, "Rewrote bulk data URI");
                        *uri = local;
                        rewritten += 1;
                    }
                }
                continue;
            }
            rewritten += self.visit(value, depth + 1);
        }
        rewritten
    }
}

impl Default for BulkDataRewriter {
    fn default() -> Self {
        let config = RewriteConfig::default();
        Self {
            pattern: Regex::new(&config.upstream_pattern).expect("default rewrite pattern is valid"),
            local_base: config.local_base_url.trim_end_matches('/').to_string(),
            max_depth: config.max_depth,
        }
    }
}
