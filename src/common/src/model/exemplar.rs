use super::labels::Labels;

/// A trace-correlating data point attached to a sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exemplar {
    pub labels: Labels,
    pub value: f64,
    /// Milliseconds since epoch. Absent when the target did not expose one.
    pub timestamp: Option<i64>,
}

impl Exemplar {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
