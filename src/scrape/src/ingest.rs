//! The ingestion loop.
//!
//! One call to [`Ingester::ingest`] turns a scrape payload into appends. Every
//! sample is resolved through the target's [`ScrapeCache`] first; only metric
//! texts the cache has not seen are parsed into labels, relabeled and
//! validated. Samples rejected by storage for ordering or bounds reasons are
//! dropped and counted, limit breaches are remembered and reported once the
//! payload is exhausted, and anything else aborts the pass.
//!
//! After a pass without fatal errors or limit breaches the series that
//! vanished since the previous scrape get a stale marker and the cache runs
//! its maintenance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::config::ScrapeConfig;
use common::model::{Exemplar, Label, Labels, METRIC_NAME, Metadata, NativeHistogram, stale_nan};

use crate::cache::ScrapeCache;
use crate::error::{IngestError, Result};
use crate::limit::limited;
use crate::mutator::LabelMutator;
use crate::parser::{Entry, Parser, ParserFactory};
use crate::storage::{Appender, SeriesRef, StorageError};

/// Samples rejected by storage during one pass that did not abort it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AppendErrors {
    pub out_of_order: usize,
    pub duplicate_timestamp: usize,
    pub out_of_bounds: usize,
    pub exemplar_out_of_order: usize,
}

impl AppendErrors {
    fn log(&self) {
        if self.out_of_order > 0 {
            tracing::warn!(
                num_dropped = self.out_of_order,
                "Error on ingesting out-of-order samples"
            );
        }
        if self.duplicate_timestamp > 0 {
            tracing::warn!(
                num_dropped = self.duplicate_timestamp,
                "Error on ingesting samples with different value but same timestamp"
            );
        }
        if self.out_of_bounds > 0 {
            tracing::warn!(
                num_dropped = self.out_of_bounds,
                "Error on ingesting samples that are too old or are too far into the future"
            );
        }
        if self.exemplar_out_of_order > 0 {
            tracing::warn!(
                num_dropped = self.exemplar_out_of_order,
                "Error on ingesting out-of-order exemplars"
            );
        }
    }
}

/// Ingests scrape payloads of one target.
pub struct Ingester<P, M> {
    parsers: P,
    mutator: M,
    config: ScrapeConfig,
}

impl<P, M> Ingester<P, M>
where
    P: ParserFactory,
    M: LabelMutator,
{
    pub fn new(parsers: P, mutator: M, config: ScrapeConfig) -> Self {
        Self {
            parsers,
            mutator,
            config,
        }
    }

    /// Appends the contents of `payload` to `app`.
    ///
    /// Samples without an exposed timestamp are stamped with `scrape_time`.
    /// Returns the first fatal error, otherwise a breached sample limit,
    /// otherwise a breached bucket limit.
    pub fn ingest(
        &self,
        app: &mut dyn Appender,
        cache: &mut ScrapeCache,
        payload: &[u8],
        content_type: &str,
        scrape_time: DateTime<Utc>,
    ) -> Result<()> {
        let default_ts = scrape_time.timestamp_millis();
        let mut parser = self.parsers.new_parser(payload, content_type);
        let mut app = limited(
            Box::new(app),
            self.config.sample_limit,
            self.config.bucket_limit,
        );

        let mut pass = IngestPass::new(&self.config, &self.mutator, default_ts);
        let mut result = pass.run(parser.as_mut(), app.as_mut(), cache);

        if let Err(err) = &result {
            tracing::debug!(error = %err, "Scrape ingestion aborted");
        }

        pass.errors.log();
        if let Some(err) = &pass.sample_limit_err {
            tracing::warn!(
                error = %err,
                sample_limit = self.config.sample_limit,
                "Scrape exceeded the sample limit"
            );
        }

        if result.is_ok() {
            if let Some(err) = pass.sample_limit_err.or(pass.bucket_limit_err) {
                result = Err(err.into());
            }
        }

        // Series rejected by a limit were not tracked, so sweeping now would
        // mark still exposed series stale.
        if result.is_ok() && !payload.is_empty() {
            result = append_stale_markers(app.as_mut(), cache, default_ts);
        }

        if result.is_ok() {
            cache.end_iteration(!payload.is_empty());
        }

        result
    }
}

/// Appends a stale marker for every series of the previous scrape that is
/// missing from this one.
fn append_stale_markers(app: &mut dyn Appender, cache: &ScrapeCache, ts: i64) -> Result<()> {
    let mut failure = None;
    cache.for_each_stale(|labels| {
        match app.append(SeriesRef::NONE, labels, ts, stale_nan()) {
            // A newer sample already exists or the series was already marked.
            Ok(_)
            | Err(StorageError::OutOfOrderSample)
            | Err(StorageError::DuplicateSampleForTimestamp) => true,
            Err(err) => {
                failure = Some(err);
                false
            }
        }
    });

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

enum SampleValue<'p> {
    Float(f64),
    Histogram(&'p NativeHistogram),
}

/// How a storage error affects the current sample.
enum Rejection {
    /// Sample dropped, continue with the next entry.
    Skip,
    /// Sample dropped by a limit. Exemplars and metadata are still forwarded.
    Limited,
}

/// State of one pass over a payload.
struct IngestPass<'a, M> {
    config: &'a ScrapeConfig,
    mutator: &'a M,
    default_ts: i64,
    errors: AppendErrors,
    sample_limit_err: Option<StorageError>,
    bucket_limit_err: Option<StorageError>,
    scratch: Vec<Label>,
    exemplar: Exemplar,
}

impl<'a, M: LabelMutator> IngestPass<'a, M> {
    fn new(config: &'a ScrapeConfig, mutator: &'a M, default_ts: i64) -> Self {
        Self {
            config,
            mutator,
            default_ts,
            errors: AppendErrors::default(),
            sample_limit_err: None,
            bucket_limit_err: None,
            scratch: Vec::new(),
            exemplar: Exemplar::default(),
        }
    }

    fn run(
        &mut self,
        parser: &mut dyn Parser,
        app: &mut dyn Appender,
        cache: &mut ScrapeCache,
    ) -> Result<()> {
        while let Some(entry) = parser.next()? {
            match entry {
                Entry::Type => {
                    let (metric, metric_type) = parser.metric_type();
                    cache.set_type(metric, metric_type);
                }
                Entry::Help => {
                    let (metric, help) = parser.help();
                    cache.set_help(metric, help);
                }
                Entry::Unit => {
                    let (metric, unit) = parser.unit();
                    cache.set_unit(metric, unit);
                }
                Entry::Comment => {}
                Entry::Series | Entry::Histogram => self.sample(entry, parser, app, cache)?,
            }
        }
        Ok(())
    }

    fn sample(
        &mut self,
        entry: Entry,
        parser: &mut dyn Parser,
        app: &mut dyn Appender,
        cache: &mut ScrapeCache,
    ) -> Result<()> {
        let (metric, exposed_ts, value) = if entry == Entry::Histogram {
            let (metric, ts, histogram) = parser.histogram();
            (metric, ts, SampleValue::Histogram(histogram))
        } else {
            let (metric, ts, value) = parser.series();
            (metric, ts, SampleValue::Float(value))
        };
        let exposed_ts = exposed_ts.filter(|_| self.config.honor_timestamps);
        let ts = exposed_ts.unwrap_or(self.default_ts);

        if cache.is_dropped(metric) {
            return Ok(());
        }

        let (series, labels, hash, cached) = match cache.resolve(metric) {
            Some(entry) => (entry.series, Arc::clone(&entry.labels), entry.hash, true),
            None => {
                parser.metric(&mut self.scratch);
                let exposed = Labels::new(self.scratch.drain(..).collect());
                let hash = exposed.hash();

                let labels = self.mutator.mutate(exposed);
                if labels.is_empty() {
                    cache.mark_dropped(metric);
                    return Ok(());
                }
                if !labels.has(METRIC_NAME) {
                    return Err(IngestError::MissingMetricName);
                }
                if !labels.is_valid() {
                    return Err(IngestError::InvalidLabels(labels.to_string()));
                }
                (SeriesRef::NONE, Arc::new(labels), hash, false)
            }
        };

        let pending_metadata = if self.config.enable_metadata_storage {
            labels
                .metric_name()
                .and_then(|name| cache.changed_metadata(name, !cached))
        } else {
            None
        };

        let appended = match value {
            SampleValue::Float(value) => app.append(series, &labels, ts, value),
            SampleValue::Histogram(histogram) => app.append_histogram(series, &labels, ts, histogram),
        };

        let series = match appended {
            Ok(series) => {
                if exposed_ts.is_none() {
                    cache.track_staleness(hash, Arc::clone(&labels));
                }
                if !cached {
                    cache.insert(metric, series, Arc::clone(&labels), hash);
                }
                series
            }
            Err(err) => match self.reject(err, metric)? {
                Rejection::Skip => return Ok(()),
                Rejection::Limited => SeriesRef::NONE,
            },
        };

        while parser.next_exemplar(&mut self.exemplar) {
            if self.exemplar.timestamp.is_none() {
                self.exemplar.timestamp = Some(ts);
            }
            match app.append_exemplar(series, &labels, &self.exemplar) {
                Ok(_) => {}
                Err(StorageError::OutOfOrderExemplar) => {
                    self.errors.exemplar_out_of_order += 1;
                    tracing::debug!(series = %labels, "Out of order exemplar");
                }
                Err(err) => {
                    tracing::debug!(series = %labels, error = %err, "Error while adding exemplar")
                }
            }
            self.exemplar.reset();
        }

        if let Some(metadata) = pending_metadata {
            self.forward_metadata(app, series, &labels, &metadata);
        }

        Ok(())
    }

    /// Classifies a failed append. Errors that abort the pass are returned.
    fn reject(&mut self, err: StorageError, metric: &[u8]) -> Result<Rejection> {
        let series = String::from_utf8_lossy(metric);
        match err {
            StorageError::OutOfOrderSample => {
                self.errors.out_of_order += 1;
                tracing::debug!(series = %series, "Out of order sample");
                Ok(Rejection::Skip)
            }
            StorageError::DuplicateSampleForTimestamp => {
                self.errors.duplicate_timestamp += 1;
                tracing::debug!(series = %series, "Duplicate sample for timestamp");
                Ok(Rejection::Skip)
            }
            StorageError::OutOfBounds => {
                self.errors.out_of_bounds += 1;
                tracing::debug!(series = %series, "Out of bounds metric");
                Ok(Rejection::Skip)
            }
            StorageError::SampleLimitExceeded => {
                self.sample_limit_err = Some(err);
                Ok(Rejection::Limited)
            }
            StorageError::BucketLimitExceeded => {
                self.bucket_limit_err = Some(err);
                Ok(Rejection::Limited)
            }
            err => Err(err.into()),
        }
    }

    fn forward_metadata(
        &self,
        app: &mut dyn Appender,
        series: SeriesRef,
        labels: &Labels,
        metadata: &Metadata,
    ) {
        if let Err(err) = app.update_metadata(series, labels, metadata) {
            tracing::debug!(series = %labels, error = %err, "Error while updating metadata");
        }
    }
}
