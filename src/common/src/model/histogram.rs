//! Native histogram samples.
//!
//! Buckets are stored the way the exposition and remote-write formats carry
//! them: spans describe which bucket indexes are populated and the bucket
//! vectors hold the counts (deltas for integer histograms, absolute values for
//! float histograms).

use super::value::is_stale_nan;

/// Bucket span for native histograms
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSpan {
    pub offset: i32,
    pub length: u32,
}

/// Native histogram with integer counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    pub schema: i32,
    pub zero_threshold: f64,
    pub zero_count: u64,
    pub count: u64,
    pub sum: f64,
    pub positive_spans: Vec<BucketSpan>,
    pub negative_spans: Vec<BucketSpan>,
    pub positive_buckets: Vec<i64>,
    pub negative_buckets: Vec<i64>,
}

/// Native histogram with floating-point counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloatHistogram {
    pub schema: i32,
    pub zero_threshold: f64,
    pub zero_count: f64,
    pub count: f64,
    pub sum: f64,
    pub positive_spans: Vec<BucketSpan>,
    pub negative_spans: Vec<BucketSpan>,
    pub positive_buckets: Vec<f64>,
    pub negative_buckets: Vec<f64>,
}

/// A native histogram sample in whichever representation the target exposed.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeHistogram {
    Integer(Histogram),
    Float(FloatHistogram),
}

impl NativeHistogram {
    /// Number of populated positive and negative buckets.
    pub fn bucket_count(&self) -> usize {
        match self {
            Self::Integer(h) => h.positive_buckets.len() + h.negative_buckets.len(),
            Self::Float(fh) => fh.positive_buckets.len() + fh.negative_buckets.len(),
        }
    }

    /// Stale markers for histograms carry the stale NaN in their sum.
    pub fn is_stale(&self) -> bool {
        match self {
            Self::Integer(h) => is_stale_nan(h.sum),
            Self::Float(fh) => is_stale_nan(fh.sum),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::value::stale_nan;

    #[test]
    fn test_bucket_count_sums_both_sides() {
        let h = NativeHistogram::Integer(Histogram {
            positive_buckets: vec![1, 2, 3],
            negative_buckets: vec![1],
            ..Default::default()
        });
        assert_eq!(h.bucket_count(), 4);

        let fh = NativeHistogram::Float(FloatHistogram {
            positive_buckets: vec![1.0],
            ..Default::default()
        });
        assert_eq!(fh.bucket_count(), 1);
    }

    #[test]
    fn test_stale_histogram() {
        let h = NativeHistogram::Float(FloatHistogram {
            sum: stale_nan(),
            ..Default::default()
        });
        assert!(h.is_stale());
        assert!(!NativeHistogram::Integer(Histogram::default()).is_stale());
    }
}
