use std::time::Duration;

use metrics_util::MetricKind;
use quanta::Instant;
use serde_json::Value;
use tracing::debug;

use crate::filter::TopicMatch;
use crate::sample::{Sample, SampleKey};
use crate::value::coerce_value;

/// Samples stay visible for this many staleness windows after their last observation, so a
/// series survives one late publish.
pub const EXPIRY_MULTIPLIER: u32 = 2;

/// Default staleness window.
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(300);

/// Result of extracting samples from one message.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Samples produced, across all matching filters.
    pub samples: Vec<Sample>,

    /// Whether any extraction path yielded a value, even one that then failed coercion.
    pub observed: bool,
}

/// Turns matched messages into samples.
#[derive(Clone, Debug)]
pub struct Extractor {
    prefix: String,
    staleness_window: Duration,
}

impl Extractor {
    /// Creates a new `Extractor`.
    pub fn new(prefix: impl Into<String>, staleness_window: Duration) -> Extractor {
        Extractor { prefix: prefix.into(), staleness_window }
    }

    /// Extracts every configured value from `payload` for each filter in `matches`.
    ///
    /// The payload is parsed once.  A payload that fails to parse produces nothing.  A value whose
    /// path selects nothing, or whose value cannot be coerced, is skipped without affecting the
    /// other values and filters.
    pub fn extract(
        &self,
        topic: &str,
        payload: &[u8],
        matches: &[TopicMatch<'_>],
        now: Instant,
    ) -> Extraction {
        let mut extraction = Extraction::default();
        if matches.is_empty() {
            return extraction;
        }

        let document = match serde_json::from_slice::<Value>(payload) {
            Ok(document) => document,
            Err(e) => {
                debug!(topic, error = %e, "Failed to parse payload as JSON. Skipping message.");
                return extraction;
            }
        };

        let expires_at = now + self.staleness_window * EXPIRY_MULTIPLIER;

        for TopicMatch { filter, captures } in matches {
            let group = filter.group();
            let labels = captures.labels();

            for (value_name, path) in filter.values() {
                let Some(raw) = path.evaluate(&document) else {
                    continue;
                };
                extraction.observed = true;

                // An empty name capture falls back to the value name.
                let name =
                    captures.name_override().filter(|n| !n.is_empty()).unwrap_or(value_name);
                let value = match coerce_value(raw) {
                    Ok(value) => value,
                    Err(e) => {
                        debug!(
                            topic,
                            filter = filter.id(),
                            metric_name = name,
                            path = path.as_str(),
                            error = %e,
                            "Failed to coerce extracted value. Skipping."
                        );
                        continue;
                    }
                };

                debug!(topic, filter = filter.id(), metric_name = name, value, "Matched filter.");

                extraction.samples.push(Sample {
                    key: SampleKey::new(group, name, labels.clone()),
                    name: metric_name(&self.prefix, group, name),
                    help: metric_help(group, name),
                    value,
                    kind: MetricKind::Gauge,
                    expires_at,
                });
            }
        }

        extraction
    }
}

/// Builds the fully-qualified metric name.
///
/// The join is not reversible: group `a` with name `b_c` and group `a_b` with name `c` both give
/// `a_b_c`.  Such samples stay distinct in the store, and when their labels also agree they are
/// rendered as duplicate lines.
pub fn metric_name(prefix: &str, group: &str, name: &str) -> String {
    if group.is_empty() {
        format!("{prefix}{name}")
    } else {
        format!("{prefix}{group}_{name}")
    }
}

/// Builds the help text of a metric.
pub fn metric_help(group: &str, name: &str) -> String {
    if group.is_empty() {
        format!("MQTT value '{name}'")
    } else {
        format!("MQTT value '{group}_{name}'")
    }
}
