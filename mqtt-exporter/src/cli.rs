use std::path::PathBuf;

use clap::Parser;

use mqtt_exporter::Settings;

const ENV_SETTINGS: &str = "MQTT_EXPORTER_SETTINGS";
const ENV_LISTENING_ADDRESS: &str = "MQTT_EXPORTER_LISTENING_ADDRESS";
const ENV_METRICS_PATH: &str = "MQTT_EXPORTER_METRICS_PATH";
const ENV_CONFIGURATION_FILE: &str = "MQTT_EXPORTER_CONFIGURATION_FILE";
const ENV_BROKER: &str = "MQTT_EXPORTER_BROKER";
const ENV_CLIENT_ID: &str = "MQTT_EXPORTER_CLIENT_ID";
const ENV_QOS: &str = "MQTT_EXPORTER_QOS";
const ENV_VERBOSE: &str = "MQTT_EXPORTER_VERBOSE";

#[derive(Debug, Parser)]
#[command(name = "mqtt-exporter")]
#[command(version, about = "Exports MQTT messages as Prometheus metrics", long_about = None)]
pub struct Cli {
    /// Path to the settings file (defaults to mqtt_exporter.json, if present)
    #[arg(long, short = 's', env = ENV_SETTINGS)]
    pub settings: Option<PathBuf>,

    /// Address of the scrape endpoint, e.g. :9393
    #[arg(long, env = ENV_LISTENING_ADDRESS)]
    pub listening_address: Option<String>,

    /// Path of the scrape endpoint
    #[arg(long, env = ENV_METRICS_PATH)]
    pub metrics_path: Option<String>,

    /// Path to the filter configuration file
    #[arg(long, short = 'c', env = ENV_CONFIGURATION_FILE)]
    pub configuration_file: Option<PathBuf>,

    /// Broker address, e.g. tcp://127.0.0.1:1883
    #[arg(long, short = 'b', env = ENV_BROKER)]
    pub broker: Option<String>,

    /// MQTT client identifier
    #[arg(long, env = ENV_CLIENT_ID)]
    pub client_id: Option<String>,

    /// QoS level used for subscriptions (0, 1 or 2)
    #[arg(long, env = ENV_QOS)]
    pub qos: Option<u8>,

    /// Log at debug level
    #[arg(long, short = 'v', env = ENV_VERBOSE)]
    pub verbose: bool,
}

impl Cli {
    /// Overrides `settings` with every option given on the command line or in the environment.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(address) = &self.listening_address {
            settings.config.listening_address = address.clone();
        }
        if let Some(path) = &self.metrics_path {
            settings.config.metrics_path = path.clone();
        }
        if let Some(path) = &self.configuration_file {
            settings.config.configuration_file = path.clone();
        }
        if let Some(broker) = &self.broker {
            settings.mqtt.broker = broker.clone();
        }
        if let Some(client_id) = &self.client_id {
            settings.mqtt.client_id = client_id.clone();
        }
        if let Some(qos) = self.qos {
            settings.mqtt.qos = qos;
        }
    }
}
