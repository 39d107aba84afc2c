use std::io;
use std::path::PathBuf;

use thiserror::Error as ThisError;

/// Errors that could occur while building the exporter.
///
/// Every variant is fatal: the exporter refuses to start rather than silently dropping messages
/// for a misconfigured filter.
#[derive(Debug, ThisError)]
pub enum BuildError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file '{path}': {source}")]
    ReadConfiguration {
        /// Path of the file that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file '{path}': {source}")]
    ParseConfiguration {
        /// Path of the file that was being parsed.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// The configured payload type is not supported.
    #[error("unsupported payload type '{0}' (expected 'json')")]
    UnsupportedPayloadType(String),

    /// A filter's topic pattern failed to compile.
    #[error("invalid topic pattern for filter '{filter}': {source}")]
    InvalidFilterPattern {
        /// Identifier of the offending filter.
        filter: String,
        /// Underlying regex error.
        source: regex::Error,
    },

    /// A filter's value path failed to compile.
    #[error("invalid path for value '{value}' of filter '{filter}': {source}")]
    InvalidValuePath {
        /// Identifier of the offending filter.
        filter: String,
        /// Logical value name the path belongs to.
        value: String,
        /// Underlying path error.
        source: crate::path::PathError,
    },

    /// The listen address could not be parsed.
    #[error("invalid listen address '{0}'")]
    InvalidListenAddress(String),

    /// A value in the settings file is out of range.
    #[error("invalid setting '{name}': {reason}")]
    InvalidSetting {
        /// Name of the setting, as written in the settings file.
        name: &'static str,
        /// Details about the accepted range.
        reason: &'static str,
    },

    /// The broker address could not be parsed.
    #[error("invalid broker address '{address}': {reason}")]
    InvalidBrokerAddress {
        /// The address as configured.
        address: String,
        /// Details about the parsing failure.
        reason: String,
    },

    /// The QoS level is not one of 0, 1 or 2.
    #[error("invalid QoS level {0} (expected 0, 1 or 2)")]
    InvalidQos(u8),

    /// Binding the scrape endpoint did not succeed.
    #[error("failed to create HTTP listener: {0}")]
    FailedToCreateHTTPListener(String),

    /// Creating the Tokio runtime did not succeed.
    #[error("failed to create Tokio runtime: {0}")]
    FailedToCreateRuntime(String),

    /// Spawning a background thread did not succeed.
    #[error("failed to spawn background worker: {0}")]
    FailedToSpawnWorker(String),
}
