//! Label sets identifying a series.

use std::fmt;
use std::hash::{BuildHasher, Hasher};

use ahash::RandomState;
use serde::{Deserialize, Serialize};

/// Label carrying the metric name of a series.
pub const METRIC_NAME: &str = "__name__";

/// Separator fed to the hasher between names and values so that
/// `{a="bc"}` and `{ab="c"}` never collide.
const SEP: u8 = 0xff;

// Fixed seeds: label hashes are compared across scrapes of the same cache and
// must not change for the life of the process.
const HASH_SEEDS: (u64, u64, u64, u64) = (
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

/// A single label name/value pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered label set. Labels are kept sorted by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Labels(Vec<Label>);

impl Labels {
    pub fn new(mut labels: Vec<Label>) -> Self {
        labels.sort_by(|a, b| a.name.cmp(&b.name));
        Self(labels)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self::new(pairs.iter().map(|(n, v)| Label::new(*n, *v)).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.iter().any(|l| l.name == name)
    }

    /// Value of the `__name__` label, if present.
    pub fn metric_name(&self) -> Option<&str> {
        self.get(METRIC_NAME)
    }

    /// Stable 64-bit hash of the label set.
    pub fn hash(&self) -> u64 {
        let (k0, k1, k2, k3) = HASH_SEEDS;
        let mut hasher = RandomState::with_seeds(k0, k1, k2, k3).build_hasher();
        for label in &self.0 {
            hasher.write(label.name.as_bytes());
            hasher.write_u8(SEP);
            hasher.write(label.value.as_bytes());
            hasher.write_u8(SEP);
        }
        hasher.finish()
    }

    /// Checks the metric name and label names against the exposition format
    /// grammar and rejects duplicate label names.
    pub fn is_valid(&self) -> bool {
        let mut previous: Option<&str> = None;
        for label in &self.0 {
            if label.name == METRIC_NAME {
                if !is_valid_metric_name(&label.value) {
                    return false;
                }
            } else if !is_valid_label_name(&label.name) {
                return false;
            }
            if previous == Some(label.name.as_str()) {
                return false;
            }
            previous = Some(label.name.as_str());
        }
        true
    }

    pub fn into_inner(self) -> Vec<Label> {
        self.0
    }
}

impl From<Vec<Label>> for Labels {
    fn from(labels: Vec<Label>) -> Self {
        Self::new(labels)
    }
}

impl<'a> IntoIterator for &'a Labels {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", label.name, label.value)?;
        }
        write!(f, "}}")
    }
}

/// Matches `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Matches `[a-zA-Z_][a-zA-Z0-9_]*`.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Incrementally modifies a base label set.
///
/// Setting a label to an empty value removes it, matching how the exposition
/// format treats empty label values.
#[derive(Clone, Debug, Default)]
pub struct LabelsBuilder {
    labels: Vec<Label>,
}

impl LabelsBuilder {
    pub fn new(base: Labels) -> Self {
        Self {
            labels: base.into_inner(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    pub fn set(&mut self, name: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            return self.delete(name);
        }
        match self.labels.iter_mut().find(|l| l.name == name) {
            Some(label) => label.value = value.to_string(),
            None => self.labels.push(Label::new(name, value)),
        }
        self
    }

    pub fn delete(&mut self, name: &str) -> &mut Self {
        self.labels.retain(|l| l.name != name);
        self
    }

    pub fn labels(&self) -> Labels {
        Labels::new(self.labels.clone())
    }
}
