use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Per-target ingestion behaviour and limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// More than this many samples post relabeling fail the scrape. 0 means no limit.
    pub sample_limit: usize,
    /// More than this many buckets in a native histogram fail the sample. 0 means no limit.
    pub bucket_limit: usize,
    /// Whether timestamps exposed by the target are respected.
    pub honor_timestamps: bool,
    /// Whether exposed labels win over conflicting target labels.
    pub honor_labels: bool,
    /// Whether metadata changes are forwarded to storage.
    pub enable_metadata_storage: bool,
    /// Time between two scrapes of the target
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Time budget for a single scrape
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            sample_limit: 0,
            bucket_limit: 0,
            honor_timestamps: true,
            honor_labels: false,
            enable_metadata_storage: true,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Labels and relabeling applied to every series of a target.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TargetConfig {
    /// Target labels such as `job` and `instance`
    pub labels: BTreeMap<String, String>,
    /// Metric names that are relabeled away
    pub drop_metrics: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Scrape behaviour and limits
    pub scrape: ScrapeConfig,
    /// Target labels and relabeling
    pub target: TargetConfig,
}

impl Configuration {
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Toml::file("scrapedb.toml"))
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(Toml::file(path))
    }

    fn figment(file: figment::providers::Data<Toml>) -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(file)
            .merge(Env::prefixed("SCRAPEDB__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    /// Checks values that deserialize fine but make no sense together.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scrape.interval < Duration::from_secs(1) {
            anyhow::bail!("scrape interval should be at least one second");
        }
        if self.scrape.timeout < Duration::from_secs(1) {
            anyhow::bail!("scrape timeout should be at least one second");
        }
        if self.scrape.timeout > self.scrape.interval {
            anyhow::bail!("scrape timeout cannot be greater than the scrape interval");
        }
        Ok(())
    }
}
