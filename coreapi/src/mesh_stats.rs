//! Cumulative counters for `CoreAPI::mesh_stats` (spec section 4.7), kept the
//! same shape as `backfill::BackfillStats`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct MeshStats {
    sessions_initiated: AtomicU64,
    sessions_served: AtomicU64,
    sessions_failed: AtomicU64,
    entries_received: AtomicU64,
}

/// Point-in-time snapshot of [`MeshStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub sessions_initiated: u64,
    pub sessions_served: u64,
    pub sessions_failed: u64,
    pub entries_received: u64,
}

impl MeshStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_initiated(&self, report: &mesh::SessionReport) {
        self.sessions_initiated.fetch_add(1, Ordering::Relaxed);
        self.entries_received.fetch_add(report.entries_received as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_served(&self, report: &mesh::SessionReport) {
        self.sessions_served.fetch_add(1, Ordering::Relaxed);
        self.entries_received.fetch_add(report.entries_received as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            sessions_initiated: self.sessions_initiated.load(Ordering::Relaxed),
            sessions_served: self.sessions_served.load(Ordering::Relaxed),
            sessions_failed: self.sessions_failed.load(Ordering::Relaxed),
            entries_received: self.entries_received.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiated_and_served_both_accumulate_entries_received() {
        let stats = MeshStats::new();
        stats.record_initiated(&mesh::SessionReport { entries_received: 3, batches_exchanged: 1 });
        stats.record_served(&mesh::SessionReport { entries_received: 2, batches_exchanged: 1 });
        stats.record_failed();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.sessions_initiated, 1);
        assert_eq!(snapshot.sessions_served, 1);
        assert_eq!(snapshot.sessions_failed, 1);
        assert_eq!(snapshot.entries_received, 5);
    }
}
