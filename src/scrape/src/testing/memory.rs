//! An in-memory appender recording everything written through it.

use std::collections::HashMap;

use common::model::{Exemplar, Labels, Metadata, NativeHistogram, is_stale_nan};

use crate::storage::{Appender, Result, SeriesRef, StorageError};

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub series: SeriesRef,
    pub labels: Labels,
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn is_stale(&self) -> bool {
        is_stale_nan(self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSample {
    pub series: SeriesRef,
    pub labels: Labels,
    pub timestamp: i64,
    pub histogram: NativeHistogram,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExemplarRecord {
    pub series: SeriesRef,
    pub labels: Labels,
    pub exemplar: Exemplar,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub series: SeriesRef,
    pub labels: Labels,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy)]
struct Head {
    timestamp: i64,
    value_bits: u64,
}

/// Appender backed by vectors.
///
/// Series references are handed out per distinct label set, starting at 1.
/// Float samples older than the newest sample of their series are rejected as
/// out of order, and a different value at the newest timestamp is rejected as
/// a duplicate, matching what a head block enforces.
#[derive(Debug, Default)]
pub struct MemoryAppender {
    refs: HashMap<Labels, SeriesRef>,
    heads: HashMap<SeriesRef, Head>,
    rejections: HashMap<String, StorageError>,
    withhold_refs: bool,

    samples: Vec<Sample>,
    histograms: Vec<HistogramSample>,
    exemplars: Vec<ExemplarRecord>,
    metadata: Vec<MetadataRecord>,
}

impl MemoryAppender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every append for series of `metric` with `err`.
    pub fn rejecting(mut self, metric: &str, err: StorageError) -> Self {
        self.rejections.insert(metric.to_string(), err);
        self
    }

    /// Accepts appends but returns [`SeriesRef::NONE`], so nothing gets cached.
    pub fn without_refs(mut self) -> Self {
        self.withhold_refs = true;
        self
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn stale_markers(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(|s| s.is_stale())
    }

    pub fn histograms(&self) -> &[HistogramSample] {
        &self.histograms
    }

    pub fn exemplars(&self) -> &[ExemplarRecord] {
        &self.exemplars
    }

    pub fn metadata(&self) -> &[MetadataRecord] {
        &self.metadata
    }

    pub fn series_count(&self) -> usize {
        self.refs.len()
    }

    /// Forgets recorded writes but keeps series references and heads.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.histograms.clear();
        self.exemplars.clear();
        self.metadata.clear();
    }

    fn check_rejected(&self, labels: &Labels) -> Result<()> {
        match labels.metric_name().and_then(|name| self.rejections.get(name)) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn resolve(&mut self, series: SeriesRef, labels: &Labels) -> SeriesRef {
        if !series.is_none() {
            return series;
        }
        if let Some(series) = self.refs.get(labels) {
            return *series;
        }
        let series = SeriesRef(self.refs.len() as u64 + 1);
        self.refs.insert(labels.clone(), series);
        series
    }

    fn handed_out(&self, series: SeriesRef) -> SeriesRef {
        if self.withhold_refs {
            SeriesRef::NONE
        } else {
            series
        }
    }
}

impl Appender for MemoryAppender {
    fn append(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        value: f64,
    ) -> Result<SeriesRef> {
        self.check_rejected(labels)?;
        let series = self.resolve(series, labels);

        if let Some(head) = self.heads.get(&series) {
            if timestamp < head.timestamp {
                return Err(StorageError::OutOfOrderSample);
            }
            if timestamp == head.timestamp {
                if head.value_bits != value.to_bits() {
                    return Err(StorageError::DuplicateSampleForTimestamp);
                }
                return Ok(self.handed_out(series));
            }
        }

        self.heads.insert(
            series,
            Head {
                timestamp,
                value_bits: value.to_bits(),
            },
        );
        self.samples.push(Sample {
            series,
            labels: labels.clone(),
            timestamp,
            value,
        });
        Ok(self.handed_out(series))
    }

    fn append_histogram(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        histogram: &NativeHistogram,
    ) -> Result<SeriesRef> {
        self.check_rejected(labels)?;
        let series = self.resolve(series, labels);
        self.histograms.push(HistogramSample {
            series,
            labels: labels.clone(),
            timestamp,
            histogram: histogram.clone(),
        });
        Ok(self.handed_out(series))
    }

    fn append_exemplar(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        exemplar: &Exemplar,
    ) -> Result<SeriesRef> {
        let series = self.resolve(series, labels);
        self.exemplars.push(ExemplarRecord {
            series,
            labels: labels.clone(),
            exemplar: exemplar.clone(),
        });
        Ok(self.handed_out(series))
    }

    fn update_metadata(
        &mut self,
        series: SeriesRef,
        labels: &Labels,
        metadata: &Metadata,
    ) -> Result<SeriesRef> {
        let series = self.resolve(series, labels);
        self.metadata.push(MetadataRecord {
            series,
            labels: labels.clone(),
            metadata: metadata.clone(),
        });
        Ok(self.handed_out(series))
    }
}
