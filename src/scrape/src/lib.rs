//! Scrape ingestion: turns exposition payloads of one target into appends,
//! caching series resolution across scrapes and marking vanished series stale.

pub mod cache;
pub mod error;
pub mod ingest;
pub mod limit;
pub mod mutator;
pub mod parser;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{MetadataStore, MetricMetadata, ScrapeCache};
pub use error::IngestError;
pub use ingest::Ingester;
pub use mutator::{LabelMutator, NopMutator, TargetLabelMutator};
pub use parser::{Parser, ParserFactory};
pub use storage::{Appender, SeriesRef, StorageError};
