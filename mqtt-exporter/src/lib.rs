//! Bridges MQTT messages to Prometheus gauges.
//!
//! Messages arrive on topics matched against a set of configured filters.  Each filter names the
//! values to pull out of a JSON payload, and the named capture groups of its topic pattern turn
//! parts of the topic into the metric name and labels.  The latest value of every series is kept
//! until it goes stale, and served over HTTP in the Prometheus text exposition format.
//!
//! # Filters
//!
//! A filter is a regular expression over the topic, plus a map of value names to extraction
//! paths:
//!
//! ```json
//! {
//!   "filters": {
//!     "temp": {
//!       "filter": "sensors/(?P<L_room>[a-z]+)/temperature",
//!       "values": { "value": "$.value" },
//!       "group": "sensor"
//!     }
//!   },
//!   "prefix": "",
//!   "payloadType": "json",
//!   "topics": ["sensors/#"]
//! }
//! ```
//!
//! A message on `sensors/kitchen/temperature` with payload `{"value": 21.5}` produces
//! `sensor_value{room="kitchen"} 21.5`.
//!
//! Capture groups named `N` override the metric name, and capture groups whose names start with
//! `L` become labels.  Extraction paths select into the document with `.member`, `['member']` and
//! `[index]` selectors.  Extracted values of `true`/`ON` and `false`/`OFF` map to 1 and 0; other
//! values must parse as numbers.
//!
//! # Staleness
//!
//! Every series is reported for twice the staleness window after it was last observed.  The
//! `last_push_timestamp_seconds` gauge carries the wall-clock time of the last message that
//! yielded any value, so a silent broker shows up in alerting.
//!
//! # Usage
//!
//! ```no_run
//! use mqtt_exporter::{Configuration, ExporterBuilder, MqttBridge, MqttSettings};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let configuration = Configuration::from_path("configuration.json")?;
//! let exporter = ExporterBuilder::new(configuration).install()?;
//!
//! let bridge = MqttBridge::new(&MqttSettings::default(), exporter.topics().to_vec())?;
//! bridge.run(exporter.handler())?;
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod bridge;
pub use self::bridge::{qos_from_level, BridgeError, BrokerAddress, MqttBridge, DEFAULT_BROKER_PORT};

mod common;
pub use self::common::BuildError;

mod config;
pub use self::config::{
    parse_listen_address, Configuration, FilterDefinition, ListenerSettings, MqttSettings,
    PayloadType, Settings, DEFAULT_SETTINGS_FILE,
};

mod exporter;
pub use self::exporter::builder::{Exporter, ExporterBuilder};
pub use self::exporter::{ExporterError, ExporterFuture};

mod extract;
pub use self::extract::{
    metric_help, metric_name, Extraction, Extractor, DEFAULT_STALENESS_WINDOW, EXPIRY_MULTIPLIER,
};

mod filter;
pub use self::filter::{
    Captures, CompiledFilter, FilterSet, TopicMatch, LABEL_GROUP_PREFIX, NAME_GROUP,
};

pub mod formatting;

mod handler;
pub use self::handler::MessageHandler;

mod path;
pub use self::path::{PathError, ValuePath};

mod publisher;
pub use self::publisher::{
    CollectedMetric, Descriptor, LivenessGauge, MetricPublisher, LIVENESS_METRIC_HELP,
    LIVENESS_METRIC_NAME,
};

mod sample;
pub use self::sample::{Sample, SampleKey};

mod store;
pub use self::store::{spawn_writer, SampleSender, SampleStore, StoreWorker};

mod value;
pub use self::value::{coerce_value, CoercionError};
