//! Tracks user-initiated transfer activity so the scheduler can honor
//! `MIN_IDLE_SECONDS` (spec section 4.6: "Requires the system to be idle of
//! user-initiated transfers for at least `MIN_IDLE_SECONDS`").
//!
//! The host (`coreapi`) calls [`ActivityTracker::mark_active`] whenever a
//! swarm download starts or makes progress; this crate only ever reads it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub struct ActivityTracker {
    epoch: Instant,
    last_active_millis: AtomicU64,
}

impl ActivityTracker {
    pub fn new() -> Self {
        let epoch = Instant::now();
        Self { epoch, last_active_millis: AtomicU64::new(0) }
    }

    pub fn mark_active(&self) {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        self.last_active_millis.store(elapsed, Ordering::Relaxed);
    }

    /// How long it's been since the last recorded activity, as of `now`.
    pub fn idle_for(&self, now: Instant) -> std::time::Duration {
        let last = self.last_active_millis.load(Ordering::Relaxed);
        let last_instant = self.epoch + std::time::Duration::from_millis(last);
        now.saturating_duration_since(last_instant)
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn freshly_created_tracker_is_idle_since_construction() {
        let tracker = ActivityTracker::new();
        let later = Instant::now() + Duration::from_secs(5);
        assert!(tracker.idle_for(later) >= Duration::from_secs(5));
    }

    #[test]
    fn marking_active_resets_the_idle_clock() {
        let tracker = ActivityTracker::new();
        std::thread::sleep(Duration::from_millis(20));
        tracker.mark_active();
        assert!(tracker.idle_for(Instant::now()) < Duration::from_millis(20));
    }
}
