//! A small exposition format parser covering the Prometheus text format and
//! OpenMetrics text without native histograms.

use common::model::{Exemplar, Histogram, Label, Labels, METRIC_NAME, MetricType, NativeHistogram};

use crate::parser::{Entry, ParseError, Parser, ParserFactory};

pub const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text";
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain";

/// Picks a [`TextParser`] flavour from the media type of a content type header.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextParserFactory;

impl ParserFactory for TextParserFactory {
    fn for_content_type<'a>(
        &self,
        payload: &'a [u8],
        content_type: &str,
    ) -> Result<Box<dyn Parser + 'a>, ParseError> {
        let media_type = content_type.split(';').next().unwrap_or_default().trim();
        match media_type {
            OPENMETRICS_CONTENT_TYPE => Ok(Box::new(TextParser::openmetrics(payload))),
            PROMETHEUS_CONTENT_TYPE => Ok(Box::new(TextParser::prometheus(payload))),
            _ => Err(ParseError::UnsupportedContentType(content_type.to_string())),
        }
    }

    fn fallback<'a>(&self, payload: &'a [u8]) -> Box<dyn Parser + 'a> {
        Box::new(TextParser::prometheus(payload))
    }
}

/// Line based parser over one payload.
///
/// OpenMetrics payloads must end with `# EOF`, carry timestamps in seconds and
/// may attach one exemplar per sample. Prometheus text payloads carry
/// timestamps in milliseconds.
///
/// Never yields [`Entry::Histogram`]. Native histograms in tests come from
/// [`ScriptedParser`](super::ScriptedParser).
pub struct TextParser<'a> {
    data: &'a [u8],
    pos: usize,
    openmetrics: bool,
    done: bool,

    metric: &'a [u8],
    text: &'a [u8],
    metric_type: MetricType,
    value: f64,
    timestamp: Option<i64>,
    labels: Vec<Label>,
    exemplar: Option<Exemplar>,
    // Returned by `histogram()`, which is only valid after `Entry::Histogram`.
    histogram: NativeHistogram,
}

impl<'a> TextParser<'a> {
    pub fn openmetrics(data: &'a [u8]) -> Self {
        Self::new(data, true)
    }

    pub fn prometheus(data: &'a [u8]) -> Self {
        Self::new(data, false)
    }

    fn new(data: &'a [u8], openmetrics: bool) -> Self {
        Self {
            data,
            pos: 0,
            openmetrics,
            done: false,
            metric: &[],
            text: &[],
            metric_type: MetricType::Unknown,
            value: 0.0,
            timestamp: None,
            labels: Vec::new(),
            exemplar: None,
            histogram: NativeHistogram::Integer(Histogram::default()),
        }
    }

    fn next_line(&mut self) -> Option<&'a [u8]> {
        let data: &'a [u8] = self.data;
        let rest = data.get(self.pos..).filter(|rest| !rest.is_empty())?;
        let end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
        self.pos += end + usize::from(end < rest.len());

        let line = &rest[..end];
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }

    fn comment(&mut self, line: &'a [u8]) -> Result<Option<Entry>, ParseError> {
        let (keyword, rest) = split_token(&line[1..]);
        match keyword {
            b"EOF" if self.openmetrics => {
                self.done = true;
                let trailing = self.data.get(self.pos..).unwrap_or_default();
                if trailing.iter().any(|b| !b.is_ascii_whitespace()) {
                    return Err(syntax("unexpected data after # EOF"));
                }
                Ok(None)
            }
            b"TYPE" => {
                let (name, rest) = split_token(rest);
                if name.is_empty() {
                    return Err(syntax("TYPE line without metric name"));
                }
                self.metric = name;
                self.metric_type = String::from_utf8_lossy(rest.trim_ascii())
                    .parse()
                    .unwrap_or_default();
                Ok(Some(Entry::Type))
            }
            b"HELP" => {
                let (name, rest) = split_token(rest);
                if name.is_empty() {
                    return Err(syntax("HELP line without metric name"));
                }
                self.metric = name;
                self.text = rest;
                Ok(Some(Entry::Help))
            }
            b"UNIT" if self.openmetrics => {
                let (name, rest) = split_token(rest);
                if name.is_empty() {
                    return Err(syntax("UNIT line without metric name"));
                }
                self.metric = name;
                self.text = rest.trim_ascii();
                Ok(Some(Entry::Unit))
            }
            _ => Ok(Some(Entry::Comment)),
        }
    }

    fn sample(&mut self, line: &'a [u8]) -> Result<(), ParseError> {
        let (name_end, series_end) = series_bounds(line)?;
        let name = &line[..name_end];
        if name.is_empty() {
            return Err(syntax("sample without metric name"));
        }

        self.metric = &line[..series_end];
        self.labels.clear();
        self.labels
            .push(Label::new(METRIC_NAME, String::from_utf8_lossy(name)));
        if series_end > name_end {
            parse_labels(&line[name_end..series_end], &mut self.labels)?;
        }

        let rest = &line[series_end..];
        let (sample, exemplar) = match rest.iter().position(|&b| b == b'#') {
            Some(idx) if self.openmetrics => (&rest[..idx], Some(&rest[idx + 1..])),
            _ => (rest, None),
        };

        let (value, rest) = split_token(sample);
        self.value = parse_value(value)?;
        let (timestamp, rest) = split_token(rest);
        self.timestamp = if timestamp.is_empty() {
            None
        } else {
            Some(self.parse_timestamp(timestamp)?)
        };
        if !rest.is_empty() {
            return Err(syntax(format!(
                "unexpected trailing data in {:?}",
                String::from_utf8_lossy(line)
            )));
        }

        self.exemplar = exemplar.map(parse_exemplar).transpose()?;
        Ok(())
    }

    fn parse_timestamp(&self, token: &[u8]) -> Result<i64, ParseError> {
        let token = std::str::from_utf8(token).map_err(|_| syntax("invalid timestamp"))?;
        if self.openmetrics {
            let seconds: f64 = token
                .parse()
                .map_err(|_| syntax(format!("invalid timestamp {token:?}")))?;
            Ok((seconds * 1000.0).round() as i64)
        } else {
            token
                .parse()
                .map_err(|_| syntax(format!("invalid timestamp {token:?}")))
        }
    }
}

impl Parser for TextParser<'_> {
    fn next(&mut self) -> Result<Option<Entry>, ParseError> {
        loop {
            if self.done {
                return Ok(None);
            }
            let Some(line) = self.next_line() else {
                self.done = true;
                if self.openmetrics {
                    return Err(syntax("data does not end with # EOF"));
                }
                return Ok(None);
            };

            if line.trim_ascii().is_empty() {
                continue;
            }
            if line[0] == b'#' {
                return self.comment(line);
            }

            self.sample(line)?;
            return Ok(Some(Entry::Series));
        }
    }

    fn metric_type(&self) -> (&[u8], MetricType) {
        (self.metric, self.metric_type)
    }

    fn help(&self) -> (&[u8], &[u8]) {
        (self.metric, self.text)
    }

    fn unit(&self) -> (&[u8], &[u8]) {
        (self.metric, self.text)
    }

    fn series(&self) -> (&[u8], Option<i64>, f64) {
        (self.metric, self.timestamp, self.value)
    }

    fn histogram(&self) -> (&[u8], Option<i64>, &NativeHistogram) {
        (self.metric, self.timestamp, &self.histogram)
    }

    fn metric(&self, labels: &mut Vec<Label>) {
        labels.clear();
        labels.extend(self.labels.iter().cloned());
    }

    fn next_exemplar(&mut self, exemplar: &mut Exemplar) -> bool {
        match self.exemplar.take() {
            Some(next) => {
                *exemplar = next;
                true
            }
            None => false,
        }
    }
}

fn syntax(msg: impl Into<String>) -> ParseError {
    ParseError::Syntax(msg.into())
}

/// Splits off the next whitespace separated token.
fn split_token(s: &[u8]) -> (&[u8], &[u8]) {
    let s = s.trim_ascii_start();
    let end = s
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(s.len());
    (&s[..end], s[end..].trim_ascii_start())
}

/// End of the metric name and end of the label set of a sample line.
fn series_bounds(line: &[u8]) -> Result<(usize, usize), ParseError> {
    let name_end = line
        .iter()
        .position(|&b| b == b'{' || b.is_ascii_whitespace())
        .unwrap_or(line.len());
    if line.get(name_end) != Some(&b'{') {
        return Ok((name_end, name_end));
    }

    let mut in_quotes = false;
    let mut escaped = false;
    for (i, &b) in line.iter().enumerate().skip(name_end + 1) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_quotes => escaped = true,
            b'"' => in_quotes = !in_quotes,
            b'}' if !in_quotes => return Ok((name_end, i + 1)),
            _ => {}
        }
    }
    Err(syntax(format!(
        "unterminated label set in {:?}",
        String::from_utf8_lossy(line)
    )))
}

/// Parses `{name="value",...}` into `out`.
fn parse_labels(set: &[u8], out: &mut Vec<Label>) -> Result<(), ParseError> {
    let inner = set
        .strip_prefix(b"{")
        .and_then(|s| s.strip_suffix(b"}"))
        .ok_or_else(|| syntax("label set must be enclosed in braces"))?;

    let mut rest = inner.trim_ascii_start();
    while !rest.is_empty() {
        let eq = rest
            .iter()
            .position(|&b| b == b'=')
            .ok_or_else(|| syntax("label without value"))?;
        let name = rest[..eq].trim_ascii();
        if name.is_empty() {
            return Err(syntax("empty label name"));
        }

        let after = rest[eq + 1..].trim_ascii_start();
        let quoted = after
            .strip_prefix(b"\"")
            .ok_or_else(|| syntax("label value must be quoted"))?;
        let (value, consumed) = unquote(quoted)?;

        out.push(Label::new(String::from_utf8_lossy(name), value));

        rest = quoted[consumed..].trim_ascii_start();
        match rest.first() {
            Some(b',') => rest = rest[1..].trim_ascii_start(),
            None => {}
            Some(_) => return Err(syntax("expected ',' between labels")),
        }
    }
    Ok(())
}

/// Reads a quoted label value up to its closing quote. Returns the unescaped
/// value and the number of bytes consumed including the closing quote.
fn unquote(s: &[u8]) -> Result<(String, usize), ParseError> {
    let mut value = Vec::new();
    let mut iter = s.iter().enumerate();
    while let Some((i, &b)) = iter.next() {
        match b {
            b'"' => {
                let value =
                    String::from_utf8(value).map_err(|_| syntax("label value is not UTF-8"))?;
                return Ok((value, i + 1));
            }
            b'\\' => match iter.next() {
                Some((_, b'n')) => value.push(b'\n'),
                Some((_, &escaped)) => value.push(escaped),
                None => break,
            },
            b => value.push(b),
        }
    }
    Err(syntax("unterminated label value"))
}

fn parse_value(token: &[u8]) -> Result<f64, ParseError> {
    if token.is_empty() {
        return Err(syntax("sample without value"));
    }
    let token = std::str::from_utf8(token).map_err(|_| syntax("invalid value"))?;
    token
        .parse()
        .map_err(|_| syntax(format!("invalid value {token:?}")))
}

/// Parses ` {labels} value [timestamp]` following the `#` of a sample line.
fn parse_exemplar(s: &[u8]) -> Result<Exemplar, ParseError> {
    let s = s.trim_ascii();
    if s.first() != Some(&b'{') {
        return Err(syntax("exemplar without label set"));
    }
    let (_, end) = series_bounds(s)?;

    let mut labels = Vec::new();
    parse_labels(&s[..end], &mut labels)?;

    let (value, rest) = split_token(&s[end..]);
    let (timestamp, rest) = split_token(rest);
    if !rest.is_empty() {
        return Err(syntax("unexpected trailing data after exemplar"));
    }

    let timestamp = if timestamp.is_empty() {
        None
    } else {
        let seconds = parse_value(timestamp)?;
        Some((seconds * 1000.0).round() as i64)
    };

    Ok(Exemplar {
        labels: Labels::new(labels),
        value: parse_value(value)?,
        timestamp,
    })
}
