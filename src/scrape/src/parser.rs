//! The exposition parser seam.
//!
//! A parser is a cursor over one payload: [`Parser::next`] advances to the next
//! entry and the accessor matching the returned [`Entry`] reads its contents.
//! Accessors borrow from the payload so the ingestion loop can look up the
//! raw metric text without copying it.

use common::model::{Exemplar, Label, MetricType, NativeHistogram};

/// Kind of the entry the parser is currently positioned on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entry {
    Type,
    Help,
    Unit,
    Comment,
    Series,
    Histogram,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("unsupported content type {0:?}")]
    UnsupportedContentType(String),
    #[error("{0}")]
    Syntax(String),
}

pub trait Parser {
    /// Advances to the next entry. `Ok(None)` signals the end of the payload.
    fn next(&mut self) -> Result<Option<Entry>, ParseError>;

    /// Metric family name and type of a [`Entry::Type`] entry.
    fn metric_type(&self) -> (&[u8], MetricType);

    /// Metric family name and help text of a [`Entry::Help`] entry.
    fn help(&self) -> (&[u8], &[u8]);

    /// Metric family name and unit of a [`Entry::Unit`] entry.
    fn unit(&self) -> (&[u8], &[u8]);

    /// Raw metric text, optional exposed timestamp in milliseconds and value
    /// of a [`Entry::Series`] entry.
    fn series(&self) -> (&[u8], Option<i64>, f64);

    /// Raw metric text, optional exposed timestamp in milliseconds and
    /// histogram of a [`Entry::Histogram`] entry.
    fn histogram(&self) -> (&[u8], Option<i64>, &NativeHistogram);

    /// Writes the labels of the current sample into `labels`, replacing its contents.
    fn metric(&self, labels: &mut Vec<Label>);

    /// Moves the next exemplar of the current sample into `exemplar`.
    /// Returns false once the sample has no exemplars left.
    fn next_exemplar(&mut self, exemplar: &mut Exemplar) -> bool;
}

/// Creates parsers for payloads based on their content type.
pub trait ParserFactory {
    /// Parser for the given content type, or an error when the content type
    /// is not one this factory understands.
    fn for_content_type<'a>(
        &self,
        payload: &'a [u8],
        content_type: &str,
    ) -> Result<Box<dyn Parser + 'a>, ParseError>;

    /// Parser for the default text exposition format.
    fn fallback<'a>(&self, payload: &'a [u8]) -> Box<dyn Parser + 'a>;

    /// Resolves a parser, falling back to the default text format when the
    /// content type is not recognized.
    fn new_parser<'a>(&self, payload: &'a [u8], content_type: &str) -> Box<dyn Parser + 'a> {
        match self.for_content_type(payload, content_type) {
            Ok(parser) => parser,
            Err(err) => {
                tracing::debug!(
                    content_type = %content_type,
                    error = %err,
                    "Invalid content type on scrape, using prometheus parser as fallback"
                );
                self.fallback(payload)
            }
        }
    }
}
