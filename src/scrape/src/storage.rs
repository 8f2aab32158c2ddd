//! The append-only storage seam the ingestion loop writes through.

use std::fmt;

use common::model::{Exemplar, Labels, Metadata, NativeHistogram};

/// Opaque reference to a series inside the storage engine.
///
/// [`SeriesRef::NONE`] asks the storage to resolve the series from its labels.
/// When an append succeeds but returns `NONE`, the storage declined to hand out
/// a reference and the series must not be cached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesRef(pub u64);

impl SeriesRef {
    pub const NONE: SeriesRef = SeriesRef(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SeriesRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors reported by an [`Appender`].
///
/// The limit variants are produced by the limit-enforcing wrappers in
/// [`crate::limit`] rather than by a storage engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("not found")]
    NotFound,
    #[error("out of order sample")]
    OutOfOrderSample,
    #[error("duplicate sample for timestamp")]
    DuplicateSampleForTimestamp,
    #[error("out of bounds")]
    OutOfBounds,
    #[error("out of order exemplar")]
    OutOfOrderExemplar,
    #[error("sample limit exceeded")]
    SampleLimitExceeded,
    #[error("histogram bucket limit exceeded")]
    BucketLimitExceeded,
    #[error("storage error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Batch appender of a time-series storage engine.
#[cfg_attr(test, mockall::automock)]
pub trait Appender {
    fn append(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        value: f64,
    ) -> Result<SeriesRef>;

    fn append_histogram(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        histogram: &NativeHistogram,
    ) -> Result<SeriesRef>;

    fn append_exemplar(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        exemplar: &Exemplar,
    ) -> Result<SeriesRef>;

    fn update_metadata(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        metadata: &Metadata,
    ) -> Result<SeriesRef>;
}

impl<A: Appender + ?Sized> Appender for &mut A {
    fn append(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        value: f64,
    ) -> Result<SeriesRef> {
        (**self).append(series, labels, timestamp, value)
    }

    fn append_histogram(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        histogram: &NativeHistogram,
    ) -> Result<SeriesRef> {
        (**self).append_histogram(series, labels, timestamp, histogram)
    }

    fn append_exemplar(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        exemplar: &Exemplar,
    ) -> Result<SeriesRef> {
        (**self).append_exemplar(series, labels, exemplar)
    }

    fn update_metadata(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        metadata: &Metadata,
    ) -> Result<SeriesRef> {
        (**self).update_metadata(series, labels, metadata)
    }
}

impl<A: Appender + ?Sized> Appender for Box<A> {
    fn append(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        value: f64,
    ) -> Result<SeriesRef> {
        (**self).append(series, labels, timestamp, value)
    }

    fn append_histogram(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        histogram: &NativeHistogram,
    ) -> Result<SeriesRef> {
        (**self).append_histogram(series, labels, timestamp, histogram)
    }

    fn append_exemplar(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        exemplar: &Exemplar,
    ) -> Result<SeriesRef> {
        (**self).append_exemplar(series, labels, exemplar)
    }

    fn update_metadata(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        metadata: &Metadata,
    ) -> Result<SeriesRef> {
        (**self).update_metadata(series, labels, metadata)
    }
}
