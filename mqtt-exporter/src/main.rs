use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};

use mqtt_exporter::{Configuration, ExporterBuilder, MqttBridge, Settings};

mod cli;

use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_ansi(true).with_level(true).with_max_level(level).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Exporter failed.");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = Settings::load(cli.settings.as_deref())?;
    cli.apply(&mut settings);

    let configuration = Configuration::from_path(&settings.config.configuration_file)?;
    info!(
        configuration = %settings.config.configuration_file.display(),
        filters = configuration.filters.len(),
        "Loaded configuration."
    );

    let bridge = MqttBridge::new(&settings.mqtt, configuration.topics.clone())?;
    let exporter = ExporterBuilder::from_settings(configuration, &settings.config)?.install()?;

    bridge.run(exporter.handler())?;

    info!("Broker connection closed. Shutting down.");
    exporter.shutdown();

    Ok(())
}
