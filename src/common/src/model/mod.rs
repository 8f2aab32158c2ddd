//! Data model shared between the ingestion pipeline and its collaborators.

pub mod exemplar;
pub mod histogram;
pub mod labels;
pub mod metadata;
pub mod value;

pub use exemplar::Exemplar;
pub use histogram::{BucketSpan, FloatHistogram, Histogram, NativeHistogram};
pub use labels::{Label, Labels, LabelsBuilder, METRIC_NAME};
pub use metadata::{Metadata, MetricType};
pub use value::{STALE_NAN_BITS, is_stale_nan, stale_nan};
