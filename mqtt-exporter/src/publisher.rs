//! Scrape-time view of the store.
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use metrics::atomics::AtomicU64;
use metrics::GaugeFn;
use metrics_util::MetricKind;

use crate::formatting::{sanitize_metric_name, write_help_line, write_metric_line, write_type_line};
use crate::store::SampleStore;

/// Name of the liveness gauge.
pub const LIVENESS_METRIC_NAME: &str = "last_push_timestamp_seconds";

/// Help text of the liveness gauge.
pub const LIVENESS_METRIC_HELP: &str = "Unix timestamp of the last received metrics push in seconds.";

/// Wall-clock time of the last message that yielded any value.
///
/// Shared between message handlers, which set it, and the publisher, which reports it.  Starts
/// at zero.
#[derive(Clone, Debug, Default)]
pub struct LivenessGauge {
    inner: Arc<AtomicU64>,
}

impl LivenessGauge {
    /// Creates a new gauge set to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gauge to `value`.
    pub fn set(&self, value: f64) {
        GaugeFn::set(&*self.inner, value);
    }

    /// Sets the gauge to the current wall-clock Unix time, in fractional seconds.
    pub fn mark_now(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or_default();
        self.set(now);
    }

    /// Current value of the gauge.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.inner.load(Ordering::Acquire))
    }
}

/// Static description of a metric the exporter always exposes.
#[derive(Clone, Debug, PartialEq)]
pub struct Descriptor {
    /// Metric name.
    pub name: String,
    /// Help text.
    pub help: String,
    /// Metric kind.
    pub kind: MetricKind,
}

/// A single series, as collected for one scrape.
#[derive(Clone, Debug, PartialEq)]
pub struct CollectedMetric {
    /// Metric name.
    pub name: String,
    /// Help text.
    pub help: String,
    /// Metric kind.
    pub kind: MetricKind,
    /// Labels of the series.
    pub labels: BTreeMap<String, String>,
    /// Current value.
    pub value: f64,
}

/// Answers scrapes from the store and the liveness gauge.
///
/// Cheap to clone; every clone reads the same store.
#[derive(Clone)]
pub struct MetricPublisher {
    store: Arc<SampleStore>,
    liveness: LivenessGauge,
}

impl MetricPublisher {
    /// Creates a new `MetricPublisher`.
    pub fn new(store: Arc<SampleStore>, liveness: LivenessGauge) -> Self {
        Self { store, liveness }
    }

    /// Describes the metrics that are always present.
    ///
    /// Sample metrics come and go with the messages, so only the liveness gauge is described.
    pub fn describe(&self) -> Vec<Descriptor> {
        vec![Descriptor {
            name: LIVENESS_METRIC_NAME.to_owned(),
            help: LIVENESS_METRIC_HELP.to_owned(),
            kind: MetricKind::Gauge,
        }]
    }

    /// Collects the liveness gauge followed by every unexpired sample.
    ///
    /// Samples are ordered by exposed (sanitized) name and then labels, so every sample of one
    /// metric is adjacent and output is stable between scrapes.
    pub fn collect(&self) -> Vec<CollectedMetric> {
        let mut samples = self
            .store
            .snapshot()
            .into_iter()
            .map(|sample| (sanitize_metric_name(&sample.name), sample))
            .collect::<Vec<_>>();
        samples.sort_by(|(a_name, a), (b_name, b)| {
            a_name.cmp(b_name).then_with(|| a.labels().cmp(b.labels()))
        });

        let mut collected = Vec::with_capacity(samples.len() + 1);
        collected.push(CollectedMetric {
            name: LIVENESS_METRIC_NAME.to_owned(),
            help: LIVENESS_METRIC_HELP.to_owned(),
            kind: MetricKind::Gauge,
            labels: BTreeMap::new(),
            value: self.liveness.get(),
        });
        collected.extend(samples.into_iter().map(|(_, sample)| CollectedMetric {
            labels: sample.key.labels().clone(),
            name: sample.name,
            help: sample.help,
            kind: sample.kind,
            value: sample.value,
        }));
        collected
    }

    /// Renders the collected metrics in the Prometheus text exposition format.
    ///
    /// Every exposed name gets exactly one `# HELP` and `# TYPE` block, taken from the first
    /// sample carrying it, even when distinct names collapse to the same one once sanitized.
    pub fn render(&self) -> String {
        let mut groups: Vec<(String, Vec<CollectedMetric>)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for metric in self.collect() {
            let name = sanitize_metric_name(&metric.name);
            match positions.get(&name) {
                Some(&position) => groups[position].1.push(metric),
                None => {
                    positions.insert(name.clone(), groups.len());
                    groups.push((name, vec![metric]));
                }
            }
        }

        let mut output = String::new();
        for (name, metrics) in &groups {
            let first = &metrics[0];
            write_help_line(&mut output, name, &first.help);
            write_type_line(&mut output, name, first.kind);
            for metric in metrics {
                write_metric_line(&mut output, name, &metric.labels, metric.value);
            }
            output.push('\n');
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use metrics_util::MetricKind;
    use quanta::{Clock, Instant};

    use super::{LivenessGauge, MetricPublisher, LIVENESS_METRIC_NAME};
    use crate::sample::{Sample, SampleKey};
    use crate::store::SampleStore;

    fn sample(name: &str, labels: &[(&str, &str)], value: f64, expires_at: Instant) -> Sample {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>();
        Sample {
            key: SampleKey::new("", name, labels),
            name: name.to_owned(),
            help: format!("MQTT value '{name}'"),
            value,
            kind: MetricKind::Gauge,
            expires_at,
        }
    }

    #[test]
    fn test_empty_store_reports_liveness_only() {
        let (clock, _mock) = Clock::mock();
        let publisher = MetricPublisher::new(Arc::new(SampleStore::new(clock)), LivenessGauge::new());

        let descriptors = publisher.describe();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, LIVENESS_METRIC_NAME);

        let collected = publisher.collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].name, LIVENESS_METRIC_NAME);
        assert_eq!(collected[0].value, 0.0);

        let expected = concat!(
            "# HELP last_push_timestamp_seconds Unix timestamp of the last received metrics push in seconds.\n",
            "# TYPE last_push_timestamp_seconds gauge\n",
            "last_push_timestamp_seconds 0\n",
            "\n",
        );
        assert_eq!(publisher.render(), expected);
    }

    #[test]
    fn test_render_groups_and_orders_samples() {
        let (clock, _mock) = Clock::mock();
        let store = Arc::new(SampleStore::new(clock.clone()));
        let liveness = LivenessGauge::new();
        liveness.set(1_700_000_000.5);

        let expires_at = clock.now() + Duration::from_secs(600);
        store.upsert(sample("sensor_value", &[("room", "kitchen")], 21.5, expires_at));
        store.upsert(sample("sensor_value", &[("room", "bath\"room")], 19.0, expires_at));
        store.upsert(sample("power", &[], f64::NAN, expires_at));

        let publisher = MetricPublisher::new(store, liveness);
        let expected = concat!(
            "# HELP last_push_timestamp_seconds Unix timestamp of the last received metrics push in seconds.\n",
            "# TYPE last_push_timestamp_seconds gauge\n",
            "last_push_timestamp_seconds 1700000000.5\n",
            "\n",
            "# HELP power MQTT value 'power'\n",
            "# TYPE power gauge\n",
            "power NaN\n",
            "\n",
            "# HELP sensor_value MQTT value 'sensor_value'\n",
            "# TYPE sensor_value gauge\n",
            "sensor_value{room=\"bath\\\"room\"} 19\n",
            "sensor_value{room=\"kitchen\"} 21.5\n",
            "\n",
        );
        assert_eq!(publisher.render(), expected);
    }

    #[test]
    fn test_names_colliding_after_sanitizing_render_once() {
        let (clock, _mock) = Clock::mock();
        let store = Arc::new(SampleStore::new(clock.clone()));
        let expires_at = clock.now() + Duration::from_secs(600);
        store.upsert(sample("temp-1", &[], 1.0, expires_at));
        store.upsert(sample("temp0", &[], 2.0, expires_at));
        store.upsert(sample("temp_1", &[("room", "attic")], 3.0, expires_at));

        let rendered = MetricPublisher::new(store, LivenessGauge::new()).render();

        assert_eq!(rendered.matches("# TYPE temp_1 gauge").count(), 1);
        assert_eq!(rendered.matches("# HELP temp_1 ").count(), 1);
        assert_eq!(rendered.matches("# TYPE temp0 gauge").count(), 1);

        let block =
            rendered.split("\n\n").find(|block| block.contains("# TYPE temp_1")).unwrap();
        assert!(block.contains("temp_1 1\n"));
        assert!(block.contains("temp_1{room=\"attic\"} 3"));
    }

    #[test]
    fn test_expired_samples_are_not_collected() {
        let (clock, mock) = Clock::mock();
        let store = Arc::new(SampleStore::new(clock.clone()));
        let now = clock.now();
        store.upsert(sample("short", &[], 1.0, now + Duration::from_secs(10)));
        store.upsert(sample("long", &[], 2.0, now + Duration::from_secs(100)));

        let publisher = MetricPublisher::new(store.clone(), LivenessGauge::new());
        assert_eq!(publisher.collect().len(), 3);

        mock.increment(Duration::from_secs(11));
        let collected = publisher.collect();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1].name, "long");

        // Scraping never mutates the store.
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_liveness_gauge_tracks_wall_clock() {
        let liveness = LivenessGauge::new();
        assert_eq!(liveness.get(), 0.0);

        liveness.mark_now();
        assert!(liveness.get() > 1_600_000_000.0);

        let shared = liveness.clone();
        shared.set(42.0);
        assert_eq!(liveness.get(), 42.0);
    }
}
