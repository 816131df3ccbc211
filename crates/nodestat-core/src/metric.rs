//! Metric vocabulary shared by collectors, the scraper and sinks.
//!
//! A [`MetricDescriptor`] is built once per collector instance and shared
//! through an `Arc`; every scrape produces fresh [`MetricSample`]s that point
//! back at their descriptor.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Namespace prefixed to every metric name.
pub const NAMESPACE: &str = "node";

/// Value semantics of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Never decreases between observations, absent an explicit reset.
    Counter,
    /// May move freely.
    Gauge,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Gauge => write!(f, "gauge"),
        }
    }
}

/// Name, help text, label names and kind of one metric family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
    pub kind: MetricKind,
}

impl MetricDescriptor {
    /// Creates a shared descriptor.
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: &[&str],
        kind: MetricKind,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            help: help.into(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
            kind,
        })
    }

    /// Shorthand for a counter under the `node` namespace.
    pub fn counter(subsystem: &str, name: &str, help: &str, label_names: &[&str]) -> Arc<Self> {
        Self::new(
            fq_name(NAMESPACE, subsystem, name),
            help,
            label_names,
            MetricKind::Counter,
        )
    }

    /// Shorthand for a gauge under the `node` namespace.
    pub fn gauge(subsystem: &str, name: &str, help: &str, label_names: &[&str]) -> Arc<Self> {
        Self::new(
            fq_name(NAMESPACE, subsystem, name),
            help,
            label_names,
            MetricKind::Gauge,
        )
    }
}

/// One observation of a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub descriptor: Arc<MetricDescriptor>,
    pub label_values: Vec<String>,
    pub value: f64,
}

impl MetricSample {
    /// Builds a sample for `descriptor`.
    ///
    /// Label values must match the descriptor's label names in arity and
    /// order; this is checked in debug builds only.
    pub fn new<S: Into<String>>(
        descriptor: &Arc<MetricDescriptor>,
        value: f64,
        label_values: impl IntoIterator<Item = S>,
    ) -> Self {
        let label_values: Vec<String> = label_values.into_iter().map(Into::into).collect();
        debug_assert_eq!(
            label_values.len(),
            descriptor.label_names.len(),
            "label arity mismatch for {}",
            descriptor.name
        );
        Self {
            descriptor: Arc::clone(descriptor),
            label_values,
            value,
        }
    }

    /// Metric name of this sample.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Looks up a label value by label name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.descriptor
            .label_names
            .iter()
            .position(|l| l == name)
            .and_then(|idx| self.label_values.get(idx))
            .map(String::as_str)
    }

    /// Iterates `(label_name, label_value)` pairs in declaration order.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.descriptor
            .label_names
            .iter()
            .map(String::as_str)
            .zip(self.label_values.iter().map(String::as_str))
    }
}

/// Joins non-empty name parts with `_`.
pub fn fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fq_name_skips_empty_parts() {
        assert_eq!(fq_name("node", "cpu", "seconds_total"), "node_cpu_seconds_total");
        assert_eq!(fq_name("node", "", "load1"), "node_load1");
        assert_eq!(fq_name("", "", "up"), "up");
    }

    #[test]
    fn test_sample_label_lookup() {
        let desc = MetricDescriptor::counter("cpu", "seconds_total", "help", &["cpu", "mode"]);
        let sample = MetricSample::new(&desc, 12.5, ["3", "idle"]);

        assert_eq!(sample.name(), "node_cpu_seconds_total");
        assert_eq!(sample.label("cpu"), Some("3"));
        assert_eq!(sample.label("mode"), Some("idle"));
        assert_eq!(sample.label("missing"), None);
        assert_eq!(
            sample.labels().collect::<Vec<_>>(),
            vec![("cpu", "3"), ("mode", "idle")]
        );
    }

    #[test]
    fn test_descriptor_shared_between_samples() {
        let desc = MetricDescriptor::gauge("", "load1", "1m load average.", &[]);
        let a = MetricSample::new(&desc, 0.5, Vec::<String>::new());
        let b = MetricSample::new(&desc, 0.7, Vec::<String>::new());

        assert!(Arc::ptr_eq(&a.descriptor, &b.descriptor));
        assert_eq!(Arc::strong_count(&desc), 3);
    }
}
