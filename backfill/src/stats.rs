//! Cumulative counters for `CoreAPI::backfill_stats` (spec section 4.7).

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct BackfillStats {
    cycles_run: AtomicU64,
    probes_attempted: AtomicU64,
    probes_succeeded: AtomicU64,
    probes_failed: AtomicU64,
    cycles_skipped_not_idle: AtomicU64,
}

/// Point-in-time snapshot of [`BackfillStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub cycles_run: u64,
    pub probes_attempted: u64,
    pub probes_succeeded: u64,
    pub probes_failed: u64,
    pub cycles_skipped_not_idle: u64,
}

impl BackfillStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_cycle_skipped(&self) {
        self.cycles_skipped_not_idle.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cycle_run(&self) {
        self.cycles_run.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_probe_attempted(&self) {
        self.probes_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_probe_succeeded(&self) {
        self.probes_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_probe_failed(&self) {
        self.probes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            cycles_run: self.cycles_run.load(Ordering::Relaxed),
            probes_attempted: self.probes_attempted.load(Ordering::Relaxed),
            probes_succeeded: self.probes_succeeded.load(Ordering::Relaxed),
            probes_failed: self.probes_failed.load(Ordering::Relaxed),
            cycles_skipped_not_idle: self.cycles_skipped_not_idle.load(Ordering::Relaxed),
        }
    }
}
