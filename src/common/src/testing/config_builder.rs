//! Test configuration builder for creating test setups quickly.

use crate::config::{Configuration, ScrapeConfig};

/// Builder for creating test configurations.
///
/// Starts from the production defaults (no limits, timestamps honored,
/// metadata storage enabled) and lets a test flip only what it cares about.
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
        }
    }

    pub fn sample_limit(mut self, limit: usize) -> Self {
        self.config.scrape.sample_limit = limit;
        self
    }

    pub fn bucket_limit(mut self, limit: usize) -> Self {
        self.config.scrape.bucket_limit = limit;
        self
    }

    pub fn honor_timestamps(mut self, honor: bool) -> Self {
        self.config.scrape.honor_timestamps = honor;
        self
    }

    pub fn honor_labels(mut self, honor: bool) -> Self {
        self.config.scrape.honor_labels = honor;
        self
    }

    pub fn metadata_storage(mut self, enabled: bool) -> Self {
        self.config.scrape.enable_metadata_storage = enabled;
        self
    }

    pub fn with_target_label(mut self, name: &str, value: &str) -> Self {
        self.config
            .target
            .labels
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn dropping_metric(mut self, metric: &str) -> Self {
        self.config.target.drop_metrics.push(metric.to_string());
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }

    /// Shorthand for tests that only need the scrape section.
    pub fn build_scrape(self) -> ScrapeConfig {
        self.config.scrape
    }
}
