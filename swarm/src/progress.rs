use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Atomic progress counters for one job. `bytes_downloaded` and
/// `completed_chunks` are individually monotonic; `active_chunks` and
/// `active_workers` may fluctuate (spec section 4.3).
#[derive(Default, Debug)]
pub struct Progress {
    bytes_downloaded: AtomicU64,
    active_chunks: AtomicU32,
    completed_chunks: AtomicU32,
    active_workers: AtomicU32,
}

/// A point-in-time, possibly inconsistent, snapshot of [`Progress`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    pub bytes_downloaded: u64,
    pub active_chunks: u32,
    pub completed_chunks: u32,
    pub active_workers: u32,
}

impl Progress {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            active_chunks: self.active_chunks.load(Ordering::Relaxed),
            completed_chunks: self.completed_chunks.load(Ordering::Relaxed),
            active_workers: self.active_workers.load(Ordering::Relaxed),
        }
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes_downloaded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn chunk_started(&self) {
        self.active_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_finished(&self) {
        self.active_chunks.fetch_sub(1, Ordering::Relaxed);
        self.completed_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_abandoned(&self) {
        self.active_chunks.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_stopped(&self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
    }
}
