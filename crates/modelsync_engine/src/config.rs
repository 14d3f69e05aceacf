//! Configuration for the sync engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Model-specific sync filter.
///
/// The expression is opaque to the engine: it is handed to the remote reader
/// and stored with the checkpoint so a changed filter forces a full sync.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncFilter(String);

impl SyncFilter {
    /// Creates a filter from its serialized expression.
    pub fn new(expression: impl Into<String>) -> Self {
        Self(expression.into())
    }

    /// The serialized expression.
    pub fn expression(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration for sync runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum records requested per page.
    pub page_size: u32,
    /// Maximum records downloaded per model per run.
    pub max_records_per_run: u64,
    /// Age after which a checkpoint is ignored and a full sync runs.
    pub sync_interval: Duration,
    /// Limit on models syncing at once when no model has associations.
    /// `None` means unbounded.
    pub max_concurrent_models: Option<usize>,
    /// Per-model filters, keyed by model name.
    pub filters: BTreeMap<String, SyncFilter>,
}

impl SyncConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            page_size: 1_000,
            max_records_per_run: 10_000,
            sync_interval: Duration::from_secs(24 * 60 * 60),
            max_concurrent_models: None,
            filters: BTreeMap::new(),
        }
    }

    /// Sets the page size. Zero is raised to one.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Sets the per-run record limit.
    pub fn with_max_records_per_run(mut self, max: u64) -> Self {
        self.max_records_per_run = max;
        self
    }

    /// Sets the full-sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Bounds how many models sync concurrently.
    pub fn with_max_concurrent_models(mut self, max: usize) -> Self {
        self.max_concurrent_models = Some(max.max(1));
        self
    }

    /// Sets the filter for one model.
    pub fn with_filter(mut self, model_name: impl Into<String>, filter: SyncFilter) -> Self {
        self.filters.insert(model_name.into(), filter);
        self
    }

    /// Returns the filter configured for a model.
    pub fn filter_for(&self, model_name: &str) -> Option<&SyncFilter> {
        self.filters.get(model_name)
    }

    /// Page limit for the next request, given how many records were received.
    ///
    /// Returns zero once the per-run maximum is reached, so the maximum is
    /// never exceeded.
    pub fn page_limit(&self, received: u64) -> u32 {
        let page_size = self.page_size.max(1);
        let remaining = self.max_records_per_run.saturating_sub(received);
        u32::try_from(remaining).map_or(page_size, |r| r.min(page_size))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.page_size, 1_000);
        assert_eq!(config.max_records_per_run, 10_000);
        assert_eq!(config.sync_interval, Duration::from_secs(86_400));
        assert_eq!(config.max_concurrent_models, None);
        assert!(config.filters.is_empty());
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_page_size(50)
            .with_max_records_per_run(120)
            .with_sync_interval(Duration::from_secs(60))
            .with_max_concurrent_models(0)
            .with_filter("Post", SyncFilter::new("rating > 3"));

        assert_eq!(config.page_size, 50);
        assert_eq!(config.max_records_per_run, 120);
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.max_concurrent_models, Some(1));
        assert_eq!(
            config.filter_for("Post").map(SyncFilter::expression),
            Some("rating > 3")
        );
        assert!(config.filter_for("Comment").is_none());
    }

    #[test]
    fn page_limit_never_exceeds_max() {
        let config = SyncConfig::new()
            .with_page_size(50)
            .with_max_records_per_run(120);

        assert_eq!(config.page_limit(0), 50);
        assert_eq!(config.page_limit(100), 20);
        assert_eq!(config.page_limit(120), 0);
        assert_eq!(config.page_limit(500), 0);
    }

    #[test]
    fn zero_page_size_still_pages() {
        let config = SyncConfig::new().with_page_size(0);
        assert_eq!(config.page_size, 1);
        assert_eq!(config.page_limit(0), 1);
        assert_eq!(config.page_limit(9_999), 1);
    }

    #[test]
    fn page_limit_with_huge_max() {
        let config = SyncConfig::new().with_max_records_per_run(u64::MAX);
        assert_eq!(config.page_limit(0), 1_000);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{ "page_size": 10, "filters": { "Post": "a = 1" } }"#)
                .unwrap();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.max_records_per_run, 10_000);
        assert_eq!(config.filter_for("Post"), Some(&SyncFilter::new("a = 1")));
    }
}
