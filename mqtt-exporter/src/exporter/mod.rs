use std::future::Future;
use std::pin::Pin;

use thiserror::Error as ThisError;

/// Errors that could stop a running exporter.
#[derive(Debug, ThisError)]
pub enum ExporterError {
    /// The scrape endpoint failed.
    #[error("HTTP listener failed: {0}")]
    HttpListener(#[from] std::io::Error),
}

/// Convenience type for Future implementing an exporter.
pub type ExporterFuture = Pin<Box<dyn Future<Output = Result<(), ExporterError>> + Send + 'static>>;

pub(crate) mod builder;
mod http_listener;
