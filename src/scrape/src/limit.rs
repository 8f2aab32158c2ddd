//! Appenders enforcing per-scrape sample and histogram bucket limits.

use common::model::{Exemplar, Labels, Metadata, NativeHistogram, is_stale_nan};

use crate::storage::{Appender, Result, SeriesRef, StorageError};

/// Wraps `app` with the configured limits. A limit of zero means unlimited and
/// leaves the appender unwrapped.
pub fn limited<'a>(
    mut app: Box<dyn Appender + 'a>,
    sample_limit: usize,
    bucket_limit: usize,
) -> Box<dyn Appender + 'a> {
    // The sample limit applies after relabeling dropped series.
    if sample_limit > 0 {
        app = Box::new(LimitAppender::new(app, sample_limit));
    }
    if bucket_limit > 0 {
        app = Box::new(BucketLimitAppender::new(app, bucket_limit));
    }
    app
}

/// Limits the number of samples appended in one batch. Stale markers are not
/// counted.
pub struct LimitAppender<A> {
    inner: A,
    limit: usize,
    count: usize,
}

impl<A: Appender> LimitAppender<A> {
    pub fn new(inner: A, limit: usize) -> Self {
        Self {
            inner,
            limit,
            count: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn admit(&mut self) -> Result<()> {
        self.count += 1;
        if self.count > self.limit {
            return Err(StorageError::SampleLimitExceeded);
        }
        Ok(())
    }
}

impl<A: Appender> Appender for LimitAppender<A> {
    fn append(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        value: f64,
    ) -> Result<SeriesRef> {
        if !is_stale_nan(value) {
            self.admit()?;
        }
        self.inner.append(series, labels, timestamp, value)
    }

    fn append_histogram(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        histogram: &NativeHistogram,
    ) -> Result<SeriesRef> {
        if !histogram.is_stale() {
            self.admit()?;
        }
        self.inner
            .append_histogram(series, labels, timestamp, histogram)
    }

    fn append_exemplar(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        exemplar: &Exemplar,
    ) -> Result<SeriesRef> {
        self.inner.append_exemplar(series, labels, exemplar)
    }

    fn update_metadata(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        metadata: &Metadata,
    ) -> Result<SeriesRef> {
        self.inner.update_metadata(series, labels, metadata)
    }
}

/// Rejects native histograms with more buckets than the limit.
pub struct BucketLimitAppender<A> {
    inner: A,
    limit: usize,
}

impl<A: Appender> BucketLimitAppender<A> {
    pub fn new(inner: A, limit: usize) -> Self {
        Self { inner, limit }
    }
}

impl<A: Appender> Appender for BucketLimitAppender<A> {
    fn append(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        value: f64,
    ) -> Result<SeriesRef> {
        self.inner.append(series, labels, timestamp, value)
    }

    fn append_histogram(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        histogram: &NativeHistogram,
    ) -> Result<SeriesRef> {
        if histogram.bucket_count() > self.limit {
            return Err(StorageError::BucketLimitExceeded);
        }
        self.inner
            .append_histogram(series, labels, timestamp, histogram)
    }

    fn append_exemplar(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        exemplar: &Exemplar,
    ) -> Result<SeriesRef> {
        self.inner.append_exemplar(series, labels, exemplar)
    }

    fn update_metadata(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        metadata: &Metadata,
    ) -> Result<SeriesRef> {
        self.inner.update_metadata(series, labels, metadata)
    }
}
