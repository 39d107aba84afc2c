use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::{
    body::{Bytes, Incoming},
    header::CONTENT_TYPE,
    server::conn::http1::Builder as HyperHttpBuilder,
    service::service_fn,
    Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use super::{ExporterError, ExporterFuture};
use crate::common::BuildError;
use crate::publisher::MetricPublisher;

/// Content type of the Prometheus text exposition format.
const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

struct HttpListeningExporter {
    inner: Arc<Inner>,
}

struct Inner {
    publisher: MetricPublisher,
    metrics_path: String,
}

impl HttpListeningExporter {
    async fn serve(&self, listener: std::net::TcpListener) -> Result<(), ExporterError> {
        let listener = TcpListener::from_std(listener)?;
        if let Ok(address) = listener.local_addr() {
            info!(%address, metrics_path = self.inner.metrics_path.as_str(), "Serving metrics.");
        }

        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!(error = ?e, "Error accepting connection. Ignoring request.");
                    continue;
                }
            };

            self.process_stream(stream);
        }
    }

    fn process_stream(&self, stream: TcpStream) {
        let inner = self.inner.clone();
        let service = service_fn(move |req: Request<Incoming>| {
            let inner = inner.clone();
            async move { Self::respond(&inner, req.uri().path()) }
        });

        tokio::task::spawn(async move {
            if let Err(err) =
                HyperHttpBuilder::new().serve_connection(TokioIo::new(stream), service).await
            {
                warn!(error = ?err, "Error serving connection.");
            };
        });
    }

    fn respond(inner: &Inner, path: &str) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
        if path == inner.metrics_path {
            Response::builder()
                .header(CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)
                .body(inner.publisher.render().into())
        } else {
            Response::builder().status(StatusCode::NOT_FOUND).body(Full::<Bytes>::default())
        }
    }
}

/// Creates an `ExporterFuture` implementing a http listener that serves the rendered metrics.
///
/// # Errors
/// Will return Err if it cannot bind to the listen address
pub(crate) fn new_http_listener(
    publisher: MetricPublisher,
    listen_address: SocketAddr,
    metrics_path: String,
) -> Result<ExporterFuture, BuildError> {
    let listener = std::net::TcpListener::bind(listen_address)
        .and_then(|listener| {
            listener.set_nonblocking(true)?;
            Ok(listener)
        })
        .map_err(|e| BuildError::FailedToCreateHTTPListener(e.to_string()))?;

    let exporter = HttpListeningExporter { inner: Arc::new(Inner { publisher, metrics_path }) };

    Ok(Box::pin(async move { exporter.serve(listener).await }))
}
