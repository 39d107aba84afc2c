use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use quanta::Clock;
use tracing::{error, info};

use super::ExporterFuture;
use crate::common::BuildError;
use crate::config::{Configuration, ListenerSettings};
use crate::extract::{Extractor, DEFAULT_STALENESS_WINDOW};
use crate::filter::FilterSet;
use crate::handler::MessageHandler;
use crate::publisher::{LivenessGauge, MetricPublisher};
use crate::store::{spawn_writer, SampleStore, StoreWorker};

const DEFAULT_LISTEN_PORT: u16 = 9393;
const DEFAULT_METRICS_PATH: &str = "/metrics";
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Builder for creating and installing the exporter.
pub struct ExporterBuilder {
    configuration: Configuration,
    listen_address: SocketAddr,
    metrics_path: String,
    staleness_window: Duration,
    sweep_interval: Duration,
    buffer_size: Option<usize>,
}

impl ExporterBuilder {
    /// Creates a new [`ExporterBuilder`] for the given message-handling configuration.
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            listen_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_LISTEN_PORT),
            metrics_path: DEFAULT_METRICS_PATH.to_owned(),
            staleness_window: DEFAULT_STALENESS_WINDOW,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            buffer_size: Some(DEFAULT_BUFFER_SIZE),
        }
    }

    /// Creates a new [`ExporterBuilder`] with every option taken from `settings`.
    ///
    /// ## Errors
    ///
    /// If a value in `settings` is out of range, or the listen address cannot be resolved, an
    /// error variant will be returned.
    pub fn from_settings(
        configuration: Configuration,
        settings: &ListenerSettings,
    ) -> Result<Self, BuildError> {
        settings.validate()?;
        Ok(Self::new(configuration)
            .with_http_listener(settings.listen_address()?)
            .with_metrics_path(settings.metrics_path.clone())
            .staleness_window(settings.staleness_window())
            .sweep_interval(settings.sweep_interval())
            .buffer_size(settings.buffer_size()))
    }

    /// Configures the exporter to expose an HTTP listener that functions as a [scrape endpoint].
    ///
    /// The HTTP listener that is spawned will respond to GET requests on the metrics path.
    ///
    /// Defaults to enabled, listening at `0.0.0.0:9393`.
    ///
    /// [scrape endpoint]: https://prometheus.io/docs/instrumenting/exposition_formats/#text-based-format
    #[must_use]
    pub fn with_http_listener(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.listen_address = addr.into();
        self
    }

    /// Sets the path the scrape endpoint answers on.
    ///
    /// Defaults to `/metrics`.  Requests for any other path get a `404 Not Found`.
    #[must_use]
    pub fn with_metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = path.into();
        self
    }

    /// Sets the staleness window.
    ///
    /// A series that is not observed again is still reported for twice this long, after which it
    /// disappears from scrapes.
    ///
    /// Defaults to 5 minutes.
    #[must_use]
    pub fn staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    /// Sets how often expired samples are removed from the store.
    ///
    /// Defaults to 1 minute.  A zero interval disables sweeping, so expired samples are hidden
    /// from scrapes but never freed; only tests that drive sweeps by hand should use it.  The
    /// settings file rejects zero.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the capacity of the queue between message handling and the store.
    ///
    /// Defaults to 1024.  `None` makes the queue unbounded.
    #[must_use]
    pub fn buffer_size(mut self, size: Option<usize>) -> Self {
        self.buffer_size = size;
        self
    }

    /// Builds the exporter and runs its HTTP listener, returning the exporter.
    ///
    /// If there is an ambient Tokio runtime on the calling thread, the listener is spawned onto
    /// it.  Otherwise, a new single-threaded Tokio runtime is created on a background thread and
    /// the listener runs there.
    ///
    /// ## Errors
    ///
    /// If there is an error while building the exporter, an error variant will be returned
    /// describing the error.
    pub fn install(self) -> Result<Exporter, BuildError> {
        use tokio::runtime;

        if let Ok(handle) = runtime::Handle::try_current() {
            let (exporter, listener) = {
                let _g = handle.enter();
                self.build()?
            };

            handle.spawn(run_listener(listener));

            Ok(exporter)
        } else {
            let runtime = runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| BuildError::FailedToCreateRuntime(e.to_string()))?;

            let (exporter, listener) = {
                let _g = runtime.enter();
                self.build()?
            };

            thread::Builder::new()
                .name("mqtt-exporter-http-listener".to_owned())
                .spawn(move || runtime.block_on(run_listener(listener)))
                .map_err(|e| BuildError::FailedToSpawnWorker(e.to_string()))?;

            Ok(exporter)
        }
    }

    /// Builds the exporter and the future driving its HTTP listener, and returns them both.
    ///
    /// In most cases, users should prefer to use [`install`][ExporterBuilder::install].  If a
    /// caller needs to schedule the listener in a particular way, this method gives them the
    /// flexibility to do so.
    ///
    /// The future must be polled from within a Tokio runtime.
    ///
    /// ## Errors
    ///
    /// If there is an error while building the exporter, or binding the listen address, an error
    /// variant will be returned describing the error.
    pub fn build(self) -> Result<(Exporter, ExporterFuture), BuildError> {
        let listen_address = self.listen_address;
        let metrics_path = self.metrics_path.clone();

        let exporter = self.build_components()?;
        let listener = super::http_listener::new_http_listener(
            exporter.publisher(),
            listen_address,
            metrics_path,
        )?;

        Ok((exporter, listener))
    }

    /// Builds the exporter without a scrape endpoint.
    ///
    /// ## Errors
    ///
    /// If the configuration is invalid, or the store writer cannot be spawned, an error variant
    /// will be returned describing the error.
    pub fn build_components(self) -> Result<Exporter, BuildError> {
        self.build_with_clock(Clock::new())
    }

    pub(crate) fn build_with_clock(self, clock: Clock) -> Result<Exporter, BuildError> {
        self.configuration.payload_type()?;
        let filters = FilterSet::compile_all(&self.configuration.filters)?;

        let store = Arc::new(SampleStore::new(clock.clone()));
        let (sender, worker) = spawn_writer(store.clone(), self.buffer_size, self.sweep_interval)?;

        let liveness = LivenessGauge::new();
        let extractor = Extractor::new(self.configuration.prefix.clone(), self.staleness_window);
        let handler = MessageHandler::new(filters, extractor, sender, liveness.clone(), clock);
        let publisher = MetricPublisher::new(store, liveness);

        info!(
            filters = handler.filter_count(),
            topics = self.configuration.topics.len(),
            prefix = self.configuration.prefix.as_str(),
            "Exporter built."
        );

        Ok(Exporter { handler, publisher, worker, topics: self.configuration.topics })
    }
}

async fn run_listener(listener: ExporterFuture) {
    if let Err(e) = listener.await {
        error!(error = %e, "Scrape endpoint stopped.");
    }
}

/// A built exporter.
///
/// Owns the store writer; dropping the exporter (or calling [`shutdown`][Exporter::shutdown])
/// stops it, after which handled messages no longer reach the store.
pub struct Exporter {
    handler: MessageHandler,
    publisher: MetricPublisher,
    worker: StoreWorker,
    topics: Vec<String>,
}

impl Exporter {
    /// Gets a handle for delivering messages.
    pub fn handler(&self) -> MessageHandler {
        self.handler.clone()
    }

    /// Gets a handle for answering scrapes.
    pub fn publisher(&self) -> MetricPublisher {
        self.publisher.clone()
    }

    /// Topics to subscribe to.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Stops the store writer and waits for it to exit.
    pub fn shutdown(self) {
        self.worker.shutdown();
    }
}
