use std::collections::BTreeMap;

use metrics_util::MetricKind;
use quanta::Instant;

/// Identity of a series.
///
/// Two observations with the same group, name and labels describe the same series, so the later
/// one replaces the earlier one in the store.  Labels are kept sorted, making the identity
/// independent of capture-group order.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SampleKey {
    group: String,
    name: String,
    labels: BTreeMap<String, String>,
}

impl SampleKey {
    /// Creates a new `SampleKey`.
    pub fn new(group: impl Into<String>, name: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        SampleKey { group: group.into(), name: name.into(), labels }
    }

    /// Group of the filter that produced the series.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Local (unprefixed, ungrouped) name of the series.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Labels of the series.
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }
}

/// The latest observation of a series.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Identity of the series.
    pub key: SampleKey,
    /// Fully-qualified metric name.
    pub name: String,
    /// Help text.
    pub help: String,
    /// Observed value.
    pub value: f64,
    /// Metric kind.
    pub kind: MetricKind,
    /// Instant after which the sample is no longer reported.
    pub expires_at: Instant,
}

impl Sample {
    /// Labels of the sample.
    pub fn labels(&self) -> &BTreeMap<String, String> {
        self.key.labels()
    }

    /// Returns `true` if the sample has expired as of `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}
