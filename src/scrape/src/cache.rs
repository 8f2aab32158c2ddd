//! Per-target scrape cache.
//!
//! Maps the exposed metric text of a sample to its resolved label set and
//! storage reference, remembers metric texts that relabeling dropped, keeps
//! metric metadata, and tracks which series were present in the current and
//! previous scrape so vanished series can be marked stale.
//!
//! Lookups use the exact bytes of the metric text. Two spellings of the same
//! label set (different label order or whitespace) are separate cache entries
//! that resolve to the same series.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use common::model::{Labels, Metadata, MetricType};
use parking_lot::Mutex;

use crate::storage::SeriesRef;

/// Iterations a metadata entry survives after its metric was last seen.
pub const METADATA_RETENTION_ITERATIONS: u64 = 10;

/// Slack allowed on top of doubling before cache growth is reported as churn.
const GROWTH_ALLOWANCE: usize = 1000;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub series: SeriesRef,
    pub last_iter: u64,
    pub hash: u64,
    pub labels: Arc<Labels>,
}

#[derive(Debug, Clone, Default)]
struct MetaEntry {
    metadata: Metadata,
    /// Last scrape iteration the entry was observed at.
    last_iter: u64,
    /// Last scrape iteration the entry was changed at.
    last_iter_change: u64,
}

impl MetaEntry {
    fn size(&self) -> usize {
        self.metadata.help.len() + self.metadata.unit.len() + self.metadata.metric_type.as_str().len()
    }
}

/// Metadata of one metric family as exported to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricMetadata {
    pub metric: String,
    pub metric_type: MetricType,
    pub help: String,
    pub unit: String,
}

impl MetricMetadata {
    fn from_entry(metric: &str, entry: &MetaEntry) -> Self {
        Self {
            metric: metric.to_string(),
            metric_type: entry.metadata.metric_type,
            help: entry.metadata.help.clone(),
            unit: entry.metadata.unit.clone(),
        }
    }
}

/// Read access to a cache's metadata from other threads.
///
/// Cloning is cheap; every clone observes the same map as the owning cache.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    inner: Arc<Mutex<HashMap<String, MetaEntry>>>,
}

impl MetadataStore {
    pub fn get(&self, metric: &str) -> Option<MetricMetadata> {
        let metadata = self.inner.lock();
        metadata
            .get(metric)
            .map(|entry| MetricMetadata::from_entry(metric, entry))
    }

    pub fn list(&self) -> Vec<MetricMetadata> {
        let metadata = self.inner.lock();
        metadata
            .iter()
            .map(|(metric, entry)| MetricMetadata::from_entry(metric, entry))
            .collect()
    }

    /// Bytes held by help texts, units and type names.
    pub fn size_bytes(&self) -> usize {
        self.inner.lock().values().map(MetaEntry::size).sum()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ScrapeCache {
    /// Current scrape iteration.
    iter: u64,

    /// How many series, dropped series and metadata entries there were at the
    /// last successful scrape.
    successful_count: usize,

    series: HashMap<Vec<u8>, CacheEntry>,
    dropped: HashMap<Vec<u8>, u64>,

    /// Labels of series seen without an explicit timestamp in the current and
    /// previous scrape, keyed by label hash. Swapped at the end of every scrape.
    series_cur: HashMap<u64, Arc<Labels>>,
    series_prev: HashMap<u64, Arc<Labels>>,

    metadata: MetadataStore,
}

impl ScrapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iteration(&self) -> u64 {
        self.iter
    }

    /// Looks up the exact metric text and marks the entry as seen in the
    /// current iteration.
    pub fn resolve(&mut self, metric: &[u8]) -> Option<&CacheEntry> {
        let iter = self.iter;
        let entry = self.series.get_mut(metric)?;
        entry.last_iter = iter;
        Some(entry)
    }

    /// Caches a resolved series. A [`SeriesRef::NONE`] reference is ignored.
    pub fn insert(
        &mut self,
        metric: &[u8],
        series: SeriesRef,
        labels: impl Into<Arc<Labels>>,
        hash: u64,
    ) {
        if series.is_none() {
            return;
        }
        self.series.insert(
            metric.to_vec(),
            CacheEntry {
                series,
                last_iter: self.iter,
                hash,
                labels: labels.into(),
            },
        );
    }

    pub fn mark_dropped(&mut self, metric: &[u8]) {
        self.dropped.insert(metric.to_vec(), self.iter);
    }

    /// Whether relabeling dropped this exact metric text before. Refreshes the
    /// marker when it did.
    pub fn is_dropped(&mut self, metric: &[u8]) -> bool {
        match self.dropped.get_mut(metric) {
            Some(iter) => {
                *iter = self.iter;
                true
            }
            None => false,
        }
    }

    /// Records a series seen without an explicit timestamp in this scrape.
    pub fn track_staleness(&mut self, hash: u64, labels: impl Into<Arc<Labels>>) {
        self.series_cur.insert(hash, labels.into());
    }

    /// Calls `f` for every series seen in the previous scrape but not in the
    /// current one. Stops early once `f` returns false.
    pub fn for_each_stale<F>(&self, mut f: F)
    where
        F: FnMut(&Labels) -> bool,
    {
        for (hash, labels) in &self.series_prev {
            if !self.series_cur.contains_key(hash) && !f(labels) {
                break;
            }
        }
    }

    /// Finishes a scrape.
    ///
    /// A scrape without data never evicts anything. A scrape with data drops
    /// series and dropped markers not seen in this iteration, drops metadata
    /// older than [`METADATA_RETENTION_ITERATIONS`], and advances the iteration.
    /// The staleness generations are swapped in both cases.
    ///
    /// Since every scrape with data prunes, the churn bound (twice the size
    /// after the last successful scrape plus [`GROWTH_ALLOWANCE`]) is only
    /// checked to log a diagnostic.
    pub fn end_iteration(&mut self, had_data: bool) {
        if had_data {
            let count = self.series.len() + self.dropped.len() + self.metadata.len();
            if count > self.successful_count * 2 + GROWTH_ALLOWANCE {
                tracing::debug!(
                    count,
                    successful_count = self.successful_count,
                    "Scrape cache grew beyond the churn bound since the last successful scrape"
                );
            }
            self.flush();
            self.successful_count = count;
        }

        mem::swap(&mut self.series_prev, &mut self.series_cur);
        self.series_cur.clear();
    }

    fn flush(&mut self) {
        let iter = self.iter;
        self.series.retain(|_, entry| entry.last_iter == iter);
        self.dropped.retain(|_, last_iter| *last_iter == iter);

        {
            let mut metadata = self.metadata.inner.lock();
            metadata.retain(|_, entry| iter - entry.last_iter <= METADATA_RETENTION_ITERATIONS);
        }

        self.iter += 1;
    }

    pub fn set_type(&self, metric: &[u8], metric_type: MetricType) {
        self.update_metadata(metric, |metadata| {
            if metadata.metric_type == metric_type {
                return false;
            }
            metadata.metric_type = metric_type;
            true
        });
    }

    pub fn set_help(&self, metric: &[u8], help: &[u8]) {
        self.update_metadata(metric, |metadata| {
            if metadata.help.as_bytes() == help {
                return false;
            }
            metadata.help = String::from_utf8_lossy(help).into_owned();
            true
        });
    }

    pub fn set_unit(&self, metric: &[u8], unit: &[u8]) {
        self.update_metadata(metric, |metadata| {
            if metadata.unit.as_bytes() == unit {
                return false;
            }
            metadata.unit = String::from_utf8_lossy(unit).into_owned();
            true
        });
    }

    fn update_metadata<F>(&self, metric: &[u8], apply: F)
    where
        F: FnOnce(&mut Metadata) -> bool,
    {
        let metric = String::from_utf8_lossy(metric);
        let mut metadata = self.metadata.inner.lock();

        if !metadata.contains_key(metric.as_ref()) {
            metadata.insert(metric.to_string(), MetaEntry::default());
        }
        let Some(entry) = metadata.get_mut(metric.as_ref()) else {
            return;
        };
        if apply(&mut entry.metadata) {
            entry.last_iter_change = self.iter;
        }
        entry.last_iter = self.iter;
    }

    /// Metadata to forward to storage for a series of `metric`: returned when
    /// the series is new or the metadata changed in the current iteration.
    pub fn changed_metadata(&self, metric: &str, new_series: bool) -> Option<Metadata> {
        let metadata = self.metadata.inner.lock();
        metadata
            .get(metric)
            .filter(|entry| new_series || entry.last_iter_change == self.iter)
            .map(|entry| entry.metadata.clone())
    }

    pub fn metadata_for(&self, metric: &str) -> Option<MetricMetadata> {
        self.metadata.get(metric)
    }

    pub fn list_metadata(&self) -> Vec<MetricMetadata> {
        self.metadata.list()
    }

    pub fn metadata_size(&self) -> usize {
        self.metadata.size_bytes()
    }

    pub fn metadata_len(&self) -> usize {
        self.metadata.len()
    }

    /// A handle for reading metadata concurrently with ingestion.
    pub fn metadata_store(&self) -> MetadataStore {
        self.metadata.clone()
    }

    pub fn series_len(&self) -> usize {
        self.series.len()
    }

    pub fn dropped_len(&self) -> usize {
        self.dropped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(name: &str) -> Labels {
        Labels::from_pairs(&[("__name__", name)])
    }

    #[test]
    fn test_get_refreshes_and_returns_same_ref() {
        let mut cache = ScrapeCache::new();
        let lset = labels("up");
        cache.insert(b"up", SeriesRef(7), lset.clone(), lset.hash());

        assert_eq!(cache.resolve(b"up").map(|e| e.series), Some(SeriesRef(7)));
        assert_eq!(cache.resolve(b"up").map(|e| e.series), Some(SeriesRef(7)));
        assert!(cache.resolve(b"up{}").is_none());
    }

    #[test]
    fn test_add_ref_ignores_none() {
        let mut cache = ScrapeCache::new();
        cache.insert(b"up", SeriesRef::NONE, labels("up"), 1);
        assert!(cache.resolve(b"up").is_none());
        assert_eq!(cache.series_len(), 0);
    }

    #[test]
    fn test_unseen_entries_are_pruned_on_successful_scrape() {
        let mut cache = ScrapeCache::new();
        cache.insert(b"a", SeriesRef(1), labels("a"), 1);
        cache.insert(b"b", SeriesRef(2), labels("b"), 2);
        cache.mark_dropped(b"c");
        cache.end_iteration(true);
        assert_eq!(cache.iteration(), 1);

        // Only "a" shows up in the next scrape.
        assert!(cache.resolve(b"a").is_some());
        cache.end_iteration(true);

        assert_eq!(cache.series_len(), 1);
        assert_eq!(cache.dropped_len(), 0);
        assert!(cache.resolve(b"b").is_none());

        // Nothing shows up in the one after.
        cache.end_iteration(true);
        assert_eq!(cache.series_len(), 0);
    }

    #[test]
    fn test_failed_scrape_never_prunes() {
        let mut cache = ScrapeCache::new();
        for i in 0..3000u64 {
            let name = format!("m{i}");
            cache.insert(name.as_bytes(), SeriesRef(i + 1), labels(&name), i);
        }
        cache.end_iteration(false);
        cache.end_iteration(false);

        assert_eq!(cache.iteration(), 0);
        assert_eq!(cache.series_len(), 3000);
    }

    #[test]
    fn test_dropped_marker_is_refreshed() {
        let mut cache = ScrapeCache::new();
        cache.mark_dropped(b"x");
        cache.end_iteration(true);

        assert!(cache.is_dropped(b"x"));
        cache.end_iteration(true);
        assert_eq!(cache.dropped_len(), 1);

        cache.end_iteration(true);
        assert!(!cache.is_dropped(b"x"));
    }

    #[test]
    fn test_staleness_generations_swap() {
        let mut cache = ScrapeCache::new();
        let a = labels("a");
        let b = labels("b");
        cache.track_staleness(a.hash(), a.clone());
        cache.track_staleness(b.hash(), b.clone());
        cache.end_iteration(true);

        cache.track_staleness(a.hash(), a.clone());

        let mut stale = Vec::new();
        cache.for_each_stale(|l| {
            stale.push(l.clone());
            true
        });
        assert_eq!(stale, vec![b]);
    }

    #[test]
    fn test_for_each_stale_stops_early() {
        let mut cache = ScrapeCache::new();
        for name in ["a", "b", "c"] {
            let lset = labels(name);
            cache.track_staleness(lset.hash(), lset);
        }
        cache.end_iteration(true);

        let mut calls = 0;
        cache.for_each_stale(|_| {
            calls += 1;
            false
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_metadata_change_tracking() {
        let mut cache = ScrapeCache::new();
        cache.set_type(b"foo", MetricType::Counter);
        cache.set_help(b"foo", b"Foo help");
        assert!(cache.changed_metadata("foo", false).is_some());
        cache.end_iteration(true);

        // Same values in the next iteration are not a change.
        cache.set_type(b"foo", MetricType::Counter);
        cache.set_help(b"foo", b"Foo help");
        assert!(cache.changed_metadata("foo", false).is_none());
        assert!(cache.changed_metadata("foo", true).is_some());

        cache.set_unit(b"foo", b"seconds");
        let meta = cache.changed_metadata("foo", false).unwrap();
        assert_eq!(meta.metric_type, MetricType::Counter);
        assert_eq!(meta.help, "Foo help");
        assert_eq!(meta.unit, "seconds");
    }

    #[test]
    fn test_metadata_grace_window() {
        let mut cache = ScrapeCache::new();
        cache.set_type(b"foo", MetricType::Gauge);
        cache.end_iteration(true);

        for _ in 0..10 {
            cache.end_iteration(true);
        }
        assert!(cache.metadata_for("foo").is_some());

        cache.end_iteration(true);
        assert!(cache.metadata_for("foo").is_none());
    }

    #[test]
    fn test_metadata_introspection() {
        let cache = ScrapeCache::new();
        cache.set_type(b"foo", MetricType::Counter);
        cache.set_help(b"foo", b"help");
        cache.set_unit(b"bar", b"bytes");

        assert_eq!(cache.metadata_len(), 2);
        // "counter" + "help" for foo, "unknown" + "bytes" for bar.
        assert_eq!(cache.metadata_size(), 7 + 4 + 7 + 5);

        let foo = cache.metadata_for("foo").unwrap();
        assert_eq!(foo.metric_type, MetricType::Counter);
        assert_eq!(foo.help, "help");

        let mut names: Vec<_> = cache.list_metadata().into_iter().map(|m| m.metric).collect();
        names.sort();
        assert_eq!(names, vec!["bar", "foo"]);
    }
}
