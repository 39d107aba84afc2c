use std::sync::Arc;

use quanta::Clock;
use tracing::trace;

use crate::extract::Extractor;
use crate::filter::FilterSet;
use crate::publisher::LivenessGauge;
use crate::store::SampleSender;

struct Inner {
    filters: FilterSet,
    extractor: Extractor,
    sender: SampleSender,
    liveness: LivenessGauge,
    clock: Clock,
}

/// Handles incoming messages, turning them into samples for the store.
///
/// Cheap to clone, and safe to call from any number of threads at once.
#[derive(Clone)]
pub struct MessageHandler {
    inner: Arc<Inner>,
}

impl MessageHandler {
    pub(crate) fn new(
        filters: FilterSet,
        extractor: Extractor,
        sender: SampleSender,
        liveness: LivenessGauge,
        clock: Clock,
    ) -> Self {
        Self { inner: Arc::new(Inner { filters, extractor, sender, liveness, clock }) }
    }

    /// Handles a message received on `topic`.
    ///
    /// The liveness gauge is refreshed whenever any configured value was found in the payload,
    /// even if it could not be turned into a sample.  Returns the number of samples handed to the
    /// store.
    pub fn handle(&self, topic: &str, payload: &[u8]) -> usize {
        let inner = &self.inner;

        let matches = inner.filters.match_topic(topic);
        if matches.is_empty() {
            trace!(topic, "No filter matched topic.");
            return 0;
        }

        let extraction = inner.extractor.extract(topic, payload, &matches, inner.clock.now());
        if extraction.observed {
            inner.liveness.mark_now();
        }

        let mut sent = 0;
        for sample in extraction.samples {
            if inner.sender.send(sample) {
                sent += 1;
            }
        }
        sent
    }

    /// Number of configured filters.
    pub fn filter_count(&self) -> usize {
        self.inner.filters.len()
    }
}
