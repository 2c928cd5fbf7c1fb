//! Running tallies of consumer outcomes.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::consumer::{DropReason, Outcome};

/// Lock-free outcome counters shared between the consumer and the
/// liveness endpoint.
#[derive(Debug, Default)]
pub struct PipelineStats {
    inserted: AtomicU64,
    diverted: AtomicU64,
    divert_failed: AtomicU64,
    dropped_decode: AtomicU64,
    dropped_store: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Records written to the primary store.
    pub inserted: u64,
    /// Duplicates written to the skipped store.
    pub diverted: u64,
    /// Duplicates that could not be written to the skipped store.
    pub divert_failed: u64,
    /// Messages discarded because they did not decode.
    pub dropped_decode: u64,
    /// Records discarded after a non-duplicate store error.
    pub dropped_store: u64,
}

impl StatsSnapshot {
    /// Total number of messages accounted for.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.inserted + self.diverted + self.divert_failed + self.dropped_decode + self.dropped_store
    }
}

impl PipelineStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one message outcome.
    pub fn record(&self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Inserted(_) => &self.inserted,
            Outcome::Diverted(_) => &self.diverted,
            Outcome::DivertFailed(_) => &self.divert_failed,
            Outcome::Dropped(DropReason::Decode) => &self.dropped_decode,
            Outcome::Dropped(DropReason::Store) => &self.dropped_store,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            inserted: self.inserted.load(Ordering::Relaxed),
            diverted: self.diverted.load(Ordering::Relaxed),
            divert_failed: self.divert_failed.load(Ordering::Relaxed),
            dropped_decode: self.dropped_decode.load(Ordering::Relaxed),
            dropped_store: self.dropped_store.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventRecord;

    #[test]
    fn counts_each_outcome_once() {
        let stats = PipelineStats::new();
        let record = EventRecord::new(1, 1, 10);
        stats.record(&Outcome::Inserted(record));
        stats.record(&Outcome::Inserted(record));
        stats.record(&Outcome::Diverted(record));
        stats.record(&Outcome::Dropped(DropReason::Decode));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.inserted, 2);
        assert_eq!(snapshot.diverted, 1);
        assert_eq!(snapshot.dropped_decode, 1);
        assert_eq!(snapshot.dropped_store, 0);
        assert_eq!(snapshot.total(), 4);
    }
}
