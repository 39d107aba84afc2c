//! Latest-value sample storage.
//!
//! The store keeps the most recent sample for every series until it expires.  All mutation is
//! funneled through a single writer thread: message handlers push samples into a channel via a
//! [`SampleSender`], and the writer applies them in arrival order, interleaved with periodic
//! sweeps of expired samples.  Readers take point-in-time snapshots under a read lock and never
//! wait on message handling.
//!
//! Expired samples are hidden from snapshots immediately, but only removed by a sweep.
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, never, select, tick, unbounded, Receiver, Sender};
use parking_lot::RwLock;
use quanta::Clock;
use tracing::{debug, error, trace, warn};

use crate::common::BuildError;
use crate::sample::{Sample, SampleKey};

/// Concurrency-safe map of series identity to latest sample.
pub struct SampleStore {
    samples: RwLock<HashMap<SampleKey, Sample>>,
    clock: Clock,
}

impl SampleStore {
    /// Creates an empty store whose expiry decisions are made against `clock`.
    pub fn new(clock: Clock) -> SampleStore {
        SampleStore { samples: RwLock::new(HashMap::new()), clock }
    }

    /// Inserts `sample`, replacing any previous sample of the same series.
    pub fn upsert(&self, sample: Sample) {
        let mut samples = self.samples.write();
        samples.insert(sample.key.clone(), sample);
    }

    /// Returns every sample that has not expired as of now.
    ///
    /// Expired samples are skipped but left in place for the next sweep.
    pub fn snapshot(&self) -> Vec<Sample> {
        let now = self.clock.now();
        let samples = self.samples.read();
        samples.values().filter(|sample| !sample.is_expired(now)).cloned().collect()
    }

    /// Removes every sample that has expired as of now, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut samples = self.samples.write();
        let before = samples.len();
        samples.retain(|_, sample| !sample.is_expired(now));
        before - samples.len()
    }

    /// Number of stored samples, expired or not.
    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }
}

/// Producer side of the store's write channel.
#[derive(Clone)]
pub struct SampleSender {
    tx: Sender<Sample>,
}

impl SampleSender {
    /// Queues `sample` for the writer.
    ///
    /// Blocks while a bounded queue is full.  Returns `false` if the writer has stopped, in
    /// which case the sample is dropped.
    pub fn send(&self, sample: Sample) -> bool {
        match self.tx.send(sample) {
            Ok(()) => true,
            Err(e) => {
                warn!(metric_name = e.0.name.as_str(), "Store writer has stopped. Dropping sample.");
                false
            }
        }
    }
}

/// Handle to the store's writer thread.
///
/// Dropping the handle stops the writer.
pub struct StoreWorker {
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl StoreWorker {
    /// Stops the writer and waits for it to exit.
    ///
    /// Samples still queued are discarded.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for StoreWorker {
    fn drop(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Store writer panicked.");
            }
        }
    }
}

/// Spawns the single writer for `store`.
///
/// `buffer_size` bounds the write queue, so producers wait for the writer once it fills up;
/// `None` leaves it unbounded.  Expired samples are swept every `sweep_interval`; a zero interval
/// disables sweeping.
///
/// # Errors
///
/// Returns [`BuildError::FailedToSpawnWorker`] if the thread could not be spawned.
pub fn spawn_writer(
    store: Arc<SampleStore>,
    buffer_size: Option<usize>,
    sweep_interval: Duration,
) -> Result<(SampleSender, StoreWorker), BuildError> {
    let (tx, rx) = match buffer_size {
        Some(size) => bounded(size),
        None => unbounded(),
    };
    let (shutdown_tx, shutdown_rx) = bounded(1);

    let handle = thread::Builder::new()
        .name("mqtt-exporter-store".to_owned())
        .spawn(move || run_writer(&store, &rx, &shutdown_rx, sweep_interval))
        .map_err(|e| BuildError::FailedToSpawnWorker(e.to_string()))?;

    Ok((SampleSender { tx }, StoreWorker { shutdown: shutdown_tx, handle: Some(handle) }))
}

fn run_writer(
    store: &SampleStore,
    samples: &Receiver<Sample>,
    shutdown: &Receiver<()>,
    sweep_interval: Duration,
) {
    let ticker = if sweep_interval.is_zero() { never() } else { tick(sweep_interval) };

    loop {
        select! {
            recv(samples) -> msg => match msg {
                Ok(sample) => {
                    trace!(metric_name = sample.name.as_str(), value = sample.value, "Storing sample.");
                    store.upsert(sample);
                }
                Err(_) => {
                    debug!("All sample producers are gone. Stopping store writer.");
                    break;
                }
            },
            recv(ticker) -> _ => {
                let removed = store.sweep();
                if removed > 0 {
                    debug!(removed, remaining = store.len(), "Swept expired samples.");
                }
            },
            recv(shutdown) -> _ => {
                debug!("Stopping store writer.");
                break;
            },
        }
    }
}
