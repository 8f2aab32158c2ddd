//! Label mutation applied to every newly seen series of a target.

use std::collections::HashSet;

use common::config::Configuration;
use common::model::{Label, Labels, LabelsBuilder};

/// Prefix under which exposed labels are kept when a target label overrides them.
pub const EXPORTED_LABEL_PREFIX: &str = "exported_";

/// Turns the label set exposed by a target into the label set that is stored.
///
/// Returning an empty set drops the series.
pub trait LabelMutator {
    fn mutate(&self, labels: Labels) -> Labels;
}

impl<F> LabelMutator for F
where
    F: Fn(Labels) -> Labels,
{
    fn mutate(&self, labels: Labels) -> Labels {
        self(labels)
    }
}

/// Leaves label sets untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopMutator;

impl LabelMutator for NopMutator {
    fn mutate(&self, labels: Labels) -> Labels {
        labels
    }
}

/// Attaches target labels to exposed series and drops configured metrics.
#[derive(Debug, Clone, Default)]
pub struct TargetLabelMutator {
    target_labels: Labels,
    honor_labels: bool,
    drop_metrics: HashSet<String>,
}

impl TargetLabelMutator {
    pub fn new(target_labels: Labels, honor_labels: bool) -> Self {
        Self {
            target_labels,
            honor_labels,
            drop_metrics: HashSet::new(),
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        let target_labels = config
            .target
            .labels
            .iter()
            .map(|(name, value)| Label::new(name.as_str(), value.as_str()))
            .collect::<Vec<_>>();

        Self {
            target_labels: Labels::new(target_labels),
            honor_labels: config.scrape.honor_labels,
            drop_metrics: config.target.drop_metrics.iter().cloned().collect(),
        }
    }

    pub fn dropping(mut self, metric: impl Into<String>) -> Self {
        self.drop_metrics.insert(metric.into());
        self
    }
}

impl LabelMutator for TargetLabelMutator {
    fn mutate(&self, labels: Labels) -> Labels {
        if labels
            .metric_name()
            .is_some_and(|name| self.drop_metrics.contains(name))
        {
            return Labels::empty();
        }

        if self.target_labels.is_empty() {
            return labels;
        }

        let mut builder = LabelsBuilder::new(labels.clone());

        if self.honor_labels {
            for label in &self.target_labels {
                if !labels.has(&label.name) {
                    builder.set(&label.name, &label.value);
                }
            }
        } else {
            let mut conflicting = Vec::new();
            for label in &self.target_labels {
                if let Some(exposed) = labels.get(&label.name).filter(|v| !v.is_empty()) {
                    conflicting.push(Label::new(label.name.as_str(), exposed));
                }
                builder.set(&label.name, &label.value);
            }

            if !conflicting.is_empty() {
                resolve_conflicting_exposed_labels(&mut builder, conflicting);
            }
        }

        builder.labels()
    }
}

/// Re-adds exposed labels that were overwritten by target labels under an
/// `exported_` name, prefixing repeatedly until the name is free.
fn resolve_conflicting_exposed_labels(builder: &mut LabelsBuilder, mut conflicting: Vec<Label>) {
    conflicting.sort_by_key(|l| l.name.len());

    for label in conflicting {
        let mut name = label.name;
        loop {
            name = format!("{EXPORTED_LABEL_PREFIX}{name}");
            if builder.get(&name).is_none() {
                builder.set(&name, &label.value);
                break;
            }
        }
    }
}
