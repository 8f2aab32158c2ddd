//! A parser replaying a fixed list of entries, for payload shapes the text
//! parser cannot express such as native histograms.

use common::model::{Exemplar, Label, Labels, MetricType, NativeHistogram};

use crate::parser::{Entry, ParseError, Parser, ParserFactory};

#[derive(Debug, Clone)]
pub enum ScriptedEntry {
    Type {
        metric: String,
        metric_type: MetricType,
    },
    Help {
        metric: String,
        help: String,
    },
    Unit {
        metric: String,
        unit: String,
    },
    Comment,
    Series {
        metric: String,
        labels: Labels,
        timestamp: Option<i64>,
        value: f64,
        exemplars: Vec<Exemplar>,
    },
    Histogram {
        metric: String,
        labels: Labels,
        timestamp: Option<i64>,
        histogram: NativeHistogram,
    },
    Error(String),
}

impl ScriptedEntry {
    /// A float sample whose metric text is the rendered label set.
    pub fn series(labels: Labels, value: f64) -> Self {
        Self::Series {
            metric: labels.to_string(),
            labels,
            timestamp: None,
            value,
            exemplars: Vec::new(),
        }
    }

    pub fn histogram(labels: Labels, histogram: NativeHistogram) -> Self {
        Self::Histogram {
            metric: labels.to_string(),
            labels,
            timestamp: None,
            histogram,
        }
    }

    pub fn metric_type(metric: &str, metric_type: MetricType) -> Self {
        Self::Type {
            metric: metric.to_string(),
            metric_type,
        }
    }

    /// Sets the exposed timestamp of a sample entry.
    pub fn at(mut self, ts: i64) -> Self {
        match &mut self {
            Self::Series { timestamp, .. } | Self::Histogram { timestamp, .. } => {
                *timestamp = Some(ts)
            }
            _ => {}
        }
        self
    }

    /// Attaches an exemplar to a float sample entry.
    pub fn with_exemplar(mut self, exemplar: Exemplar) -> Self {
        if let Self::Series { exemplars, .. } = &mut self {
            exemplars.push(exemplar);
        }
        self
    }
}

pub struct ScriptedParser {
    entries: Vec<ScriptedEntry>,
    /// Index of the next entry to return.
    next: usize,
    exemplar: usize,
    fallback: NativeHistogram,
}

impl ScriptedParser {
    pub fn new(entries: Vec<ScriptedEntry>) -> Self {
        Self {
            entries,
            next: 0,
            exemplar: 0,
            fallback: NativeHistogram::Integer(Default::default()),
        }
    }

    fn current(&self) -> Option<&ScriptedEntry> {
        self.next.checked_sub(1).and_then(|i| self.entries.get(i))
    }
}

impl Parser for ScriptedParser {
    fn next(&mut self) -> Result<Option<Entry>, ParseError> {
        let Some(entry) = self.entries.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        self.exemplar = 0;

        let entry = match entry {
            ScriptedEntry::Type { .. } => Entry::Type,
            ScriptedEntry::Help { .. } => Entry::Help,
            ScriptedEntry::Unit { .. } => Entry::Unit,
            ScriptedEntry::Comment => Entry::Comment,
            ScriptedEntry::Series { .. } => Entry::Series,
            ScriptedEntry::Histogram { .. } => Entry::Histogram,
            ScriptedEntry::Error(msg) => return Err(ParseError::Syntax(msg.clone())),
        };
        Ok(Some(entry))
    }

    fn metric_type(&self) -> (&[u8], MetricType) {
        match self.current() {
            Some(ScriptedEntry::Type {
                metric,
                metric_type,
            }) => (metric.as_bytes(), *metric_type),
            _ => (&[][..], MetricType::Unknown),
        }
    }

    fn help(&self) -> (&[u8], &[u8]) {
        match self.current() {
            Some(ScriptedEntry::Help { metric, help }) => (metric.as_bytes(), help.as_bytes()),
            _ => (&[][..], &[][..]),
        }
    }

    fn unit(&self) -> (&[u8], &[u8]) {
        match self.current() {
            Some(ScriptedEntry::Unit { metric, unit }) => (metric.as_bytes(), unit.as_bytes()),
            _ => (&[][..], &[][..]),
        }
    }

    fn series(&self) -> (&[u8], Option<i64>, f64) {
        match self.current() {
            Some(ScriptedEntry::Series {
                metric,
                timestamp,
                value,
                ..
            }) => (metric.as_bytes(), *timestamp, *value),
            _ => (&[][..], None, 0.0),
        }
    }

    fn histogram(&self) -> (&[u8], Option<i64>, &NativeHistogram) {
        match self.current() {
            Some(ScriptedEntry::Histogram {
                metric,
                timestamp,
                histogram,
                ..
            }) => (metric.as_bytes(), *timestamp, histogram),
            _ => (&[][..], None, &self.fallback),
        }
    }

    fn metric(&self, out: &mut Vec<Label>) {
        out.clear();
        if let Some(
            ScriptedEntry::Series { labels, .. } | ScriptedEntry::Histogram { labels, .. },
        ) = self.current()
        {
            out.extend(labels.iter().cloned());
        }
    }

    fn next_exemplar(&mut self, exemplar: &mut Exemplar) -> bool {
        let next = match self.current() {
            Some(ScriptedEntry::Series { exemplars, .. }) => exemplars.get(self.exemplar).cloned(),
            _ => None,
        };
        match next {
            Some(next) => {
                *exemplar = next;
                self.exemplar += 1;
                true
            }
            None => false,
        }
    }
}

/// Hands out a fresh [`ScriptedParser`] over the same script for every payload.
#[derive(Debug, Clone, Default)]
pub struct ScriptedParserFactory {
    script: Vec<ScriptedEntry>,
}

impl ScriptedParserFactory {
    pub fn new(script: Vec<ScriptedEntry>) -> Self {
        Self { script }
    }
}

impl ParserFactory for ScriptedParserFactory {
    fn for_content_type<'a>(
        &self,
        _payload: &'a [u8],
        _content_type: &str,
    ) -> Result<Box<dyn Parser + 'a>, ParseError> {
        Ok(Box::new(ScriptedParser::new(self.script.clone())))
    }

    fn fallback<'a>(&self, _payload: &'a [u8]) -> Box<dyn Parser + 'a> {
        Box::new(ScriptedParser::new(self.script.clone()))
    }
}
