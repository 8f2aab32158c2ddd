//! Test utilities for the ingestion pipeline.
//!
//! Available with the `testing` feature or during tests. Provides a reference
//! text exposition parser, a scripted parser for native histograms and an
//! in-memory appender to observe what the pipeline writes.
//!
//! ```rust,ignore
//! use scrape::testing::{MemoryAppender, TextParserFactory};
//!
//! let mut app = MemoryAppender::new();
//! ingester.ingest(&mut app, &mut cache, b"up 1\n", "text/plain", Utc::now())?;
//! assert_eq!(app.samples().len(), 1);
//! ```

mod memory;
mod scripted;
mod text;

pub use memory::{ExemplarRecord, HistogramSample, MemoryAppender, MetadataRecord, Sample};
pub use scripted::{ScriptedEntry, ScriptedParser, ScriptedParserFactory};
pub use text::{OPENMETRICS_CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE, TextParser, TextParserFactory};
