//! Connection to the MQTT broker.
use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use rumqttc::{Client, ConnectionError, Event, MqttOptions, Packet, QoS, SubscribeFilter};
use thiserror::Error as ThisError;
use tracing::{debug, error, info, warn};

use crate::common::BuildError;
use crate::config::MqttSettings;
use crate::handler::MessageHandler;

/// Port used when the broker address does not name one.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 64;

/// Errors that stop the bridge.
#[derive(Debug, ThisError)]
pub enum BridgeError {
    /// The broker could not be reached before the first successful connection.
    #[error("failed to connect to broker at {address}: {source}")]
    Connect {
        /// Broker that was being connected to.
        address: BrokerAddress,
        /// Underlying connection error.
        source: ConnectionError,
    },
}

/// Host and port of the broker.
///
/// Parsed from `tcp://host:port`, `mqtt://host:port`, `host:port` or just `host`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BrokerAddress {
    host: String,
    port: u16,
}

impl BrokerAddress {
    /// Host name or IP address of the broker.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port of the broker.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for BrokerAddress {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| BuildError::InvalidBrokerAddress {
            address: s.to_owned(),
            reason: reason.to_owned(),
        };

        let rest = match s.split_once("://") {
            Some(("tcp" | "mqtt", rest)) => rest,
            Some((scheme, _)) => return Err(invalid(&format!("unsupported scheme '{scheme}'"))),
            None => s,
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = match rest.rsplit_once(':') {
            // A bare IPv6 address has colons but no port.
            Some((host, port)) if !host.contains(':') || host.ends_with(']') => {
                let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
                (host, port)
            }
            _ => (rest, DEFAULT_BROKER_PORT),
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');

        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(BrokerAddress { host: host.to_owned(), port })
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Converts a numeric QoS level.
///
/// # Errors
///
/// Returns [`BuildError::InvalidQos`] for anything other than 0, 1 or 2.
pub fn qos_from_level(level: u8) -> Result<QoS, BuildError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(BuildError::InvalidQos(other)),
    }
}

/// Subscribes to the configured topics and feeds every received message to a handler.
#[derive(Debug)]
pub struct MqttBridge {
    address: BrokerAddress,
    client_id: String,
    qos: QoS,
    topics: Vec<String>,
}

impl MqttBridge {
    /// Creates a new `MqttBridge`.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker address or QoS level is invalid.
    pub fn new(settings: &MqttSettings, topics: Vec<String>) -> Result<Self, BuildError> {
        Ok(MqttBridge {
            address: settings.broker.parse()?,
            client_id: settings.client_id.clone(),
            qos: qos_from_level(settings.qos)?,
            topics,
        })
    }

    /// Address of the broker.
    pub fn address(&self) -> &BrokerAddress {
        &self.address
    }

    /// Runs the bridge on the calling thread.
    ///
    /// Subscriptions are (re)issued on every successful connection, so they survive reconnects.
    /// After the first successful connection, connection errors are logged and the client
    /// reconnects.  Only returns once the connection can no longer make progress.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Connect`] if the first connection attempt fails.
    pub fn run(self, handler: MessageHandler) -> Result<(), BridgeError> {
        let mut options =
            MqttOptions::new(self.client_id.clone(), self.address.host(), self.address.port());
        options.set_keep_alive(KEEP_ALIVE);

        let (client, mut connection) = Client::new(options, REQUEST_CAPACITY);
        let subscriptions = self
            .topics
            .iter()
            .map(|topic| SubscribeFilter::new(topic.clone(), self.qos))
            .collect::<Vec<_>>();

        info!(broker = %self.address, client_id = self.client_id.as_str(), "Connecting to broker.");

        let mut connected = false;
        for notification in connection.iter() {
            match notification {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    connected = true;
                    info!(broker = %self.address, "Connected to broker.");

                    if subscriptions.is_empty() {
                        warn!("No topics configured. Nothing will be received.");
                    } else if let Err(e) = client.subscribe_many(subscriptions.clone()) {
                        error!(error = %e, "Failed to subscribe to topics.");
                    } else {
                        debug!(topics = ?self.topics, qos = ?self.qos, "Subscribed to topics.");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let sent = handler.handle(&publish.topic, &publish.payload);
                    debug!(topic = publish.topic.as_str(), samples = sent, "Handled message.");
                }
                Ok(_) => {}
                Err(source) => {
                    if !connected {
                        return Err(BridgeError::Connect { address: self.address, source });
                    }
                    warn!(
                        broker = %self.address,
                        error = %source,
                        "Connection lost. Reconnecting in {:?}.",
                        RECONNECT_DELAY
                    );
                    thread::sleep(RECONNECT_DELAY);
                }
            }
        }

        Ok(())
    }
}
