//! Exporter configuration.
//!
//! Two files drive the exporter.  The *settings* file describes the process itself (where to
//! listen, which broker to connect to) and may be overridden from the command line or the
//! environment.  The *configuration* file describes what to do with messages: which topics to
//! subscribe to, and which filters turn their payloads into metrics.
use std::collections::BTreeMap;
use std::fs;
use std::net::{SocketAddr, ToSocketAddrs as _};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::common::BuildError;

/// Settings file read when none is named explicitly.
pub const DEFAULT_SETTINGS_FILE: &str = "mqtt_exporter.json";

const PAYLOAD_TYPE_JSON: &str = "json";

/// Payload encodings understood by the extraction engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PayloadType {
    /// Payloads are JSON documents.
    Json,
}

/// A single filter, as written in the configuration file.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FilterDefinition {
    /// Topic pattern.  Named capture groups parameterize the produced metrics: `N` overrides the
    /// metric name, and groups starting with `L` become labels.
    pub filter: String,

    /// Logical value name to extraction path.
    #[serde(default)]
    pub values: BTreeMap<String, String>,

    /// Group prepended to every metric name produced by this filter.
    #[serde(default)]
    pub group: String,

    /// Fixed metric name.  Accepted but currently unused.
    #[serde(default)]
    pub name: Option<String>,

    /// Label names.  Accepted but currently unused; labels come from capture groups.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Metric kind.  Accepted but currently unused; every metric is exported as a gauge.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// The message-handling configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Filters, keyed by identifier.
    #[serde(default)]
    pub filters: BTreeMap<String, FilterDefinition>,

    /// Prefix prepended to every metric name.
    #[serde(default)]
    pub prefix: String,

    /// Payload encoding.  Only `json` is supported.
    pub payload_type: String,

    /// Topics to subscribe to.
    #[serde(default)]
    pub topics: Vec<String>,
}

impl Configuration {
    /// Reads and validates the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if it names an unsupported
    /// payload type.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, BuildError> {
        let path = path.as_ref();
        let raw = fs::read(path)
            .map_err(|source| BuildError::ReadConfiguration { path: path.to_path_buf(), source })?;
        let configuration = serde_json::from_slice::<Configuration>(&raw).map_err(|source| {
            BuildError::ParseConfiguration { path: path.to_path_buf(), source }
        })?;
        configuration.payload_type()?;
        Ok(configuration)
    }

    /// Parses a configuration from a JSON string without validating it.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `raw` is not a valid configuration document.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Returns the configured payload type.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnsupportedPayloadType`] for anything other than `json`.
    pub fn payload_type(&self) -> Result<PayloadType, BuildError> {
        match self.payload_type.as_str() {
            PAYLOAD_TYPE_JSON => Ok(PayloadType::Json),
            other => Err(BuildError::UnsupportedPayloadType(other.to_owned())),
        }
    }
}

/// Exporter process settings.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Scrape endpoint and store settings.
    pub config: ListenerSettings,

    /// Broker connection settings.
    pub mqtt: MqttSettings,
}

/// Scrape endpoint and store settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListenerSettings {
    /// Address of the scrape endpoint.  `:port` listens on all interfaces.
    pub listening_address: String,

    /// Path of the scrape endpoint.
    pub metrics_path: String,

    /// Path of the message-handling configuration file.
    pub configuration_file: PathBuf,

    /// Seconds a series stays visible without being observed again, before the 2x multiplier.
    pub staleness_window: u64,

    /// Seconds between sweeps of expired samples.  Must be positive, since sweeping is the only
    /// thing that frees expired samples.
    pub sweep_interval: u64,

    /// Capacity of the queue between message handling and the store.  Zero means unbounded.
    pub buffer_size: usize,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            listening_address: ":9393".to_owned(),
            metrics_path: "/metrics".to_owned(),
            configuration_file: PathBuf::from("configuration.json"),
            staleness_window: 300,
            sweep_interval: 60,
            buffer_size: 1024,
        }
    }
}

impl ListenerSettings {
    /// Checks that every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidSetting`] for a zero sweep interval.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.sweep_interval == 0 {
            return Err(BuildError::InvalidSetting {
                name: "sweepInterval",
                reason: "must be at least 1 second",
            });
        }
        Ok(())
    }

    /// Resolves the listen address.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidListenAddress`] if the address does not resolve.
    pub fn listen_address(&self) -> Result<SocketAddr, BuildError> {
        parse_listen_address(&self.listening_address)
    }

    /// Staleness window as a [`Duration`].
    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_window)
    }

    /// Sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    /// Queue capacity, or `None` for an unbounded queue.
    pub fn buffer_size(&self) -> Option<usize> {
        (self.buffer_size > 0).then_some(self.buffer_size)
    }
}

/// Broker connection settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MqttSettings {
    /// Broker address, e.g. `tcp://127.0.0.1:1883`.
    pub broker: String,

    /// MQTT client identifier.
    pub client_id: String,

    /// QoS level used for subscriptions.
    pub qos: u8,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: "tcp://127.0.0.1:1883".to_owned(),
            client_id: "mqtt_exporter_client".to_owned(),
            qos: 0,
        }
    }
}

impl Settings {
    /// Loads settings from `path`, or from [`DEFAULT_SETTINGS_FILE`] when no path is given.
    ///
    /// A missing default file yields the default settings; a missing file that was named
    /// explicitly is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds an out-of-range value.
    pub fn load(path: Option<&Path>) -> Result<Self, BuildError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_SETTINGS_FILE);
                if !default.exists() {
                    return Ok(Settings::default());
                }
                default
            }
        };

        let raw = fs::read(&path)
            .map_err(|source| BuildError::ReadConfiguration { path: path.clone(), source })?;
        let settings = serde_json::from_slice::<Settings>(&raw)
            .map_err(|source| BuildError::ParseConfiguration { path, source })?;
        settings.config.validate()?;
        Ok(settings)
    }
}

/// Parses a listen address, accepting the `:port` shorthand for all interfaces.
///
/// # Errors
///
/// Returns [`BuildError::InvalidListenAddress`] if the address does not resolve.
pub fn parse_listen_address(address: &str) -> Result<SocketAddr, BuildError> {
    let normalized = match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => address.to_owned(),
    };

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    normalized
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| BuildError::InvalidListenAddress(address.to_owned()))
}
