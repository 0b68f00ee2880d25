//! In-memory, non-durable per-neighbor protocol violation accounting
//! (SPEC_FULL.md C.3). Mirrors the shape of `hashdb::Peer`'s
//! `backfill_today` counter: a per-key count the owner can check against a
//! threshold, without persisting it across restarts.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::neighbor::NeighborId;

/// The number of recorded violations after which `coreapi::Core` should stop
/// scheduling mesh sync sessions with a neighbor.
pub const VIOLATION_THRESHOLD: u32 = 5;

#[derive(Default)]
pub struct PeerViolations {
    counts: Mutex<HashMap<NeighborId, u32>>,
}

impl PeerViolations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one violation against `peer`, returning the new total.
    pub fn record(&self, peer: &NeighborId) -> u32 {
        let mut counts = self.counts.lock().expect("violations mutex poisoned");
        let entry = counts.entry(peer.clone()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn count(&self, peer: &NeighborId) -> u32 {
        *self.counts.lock().expect("violations mutex poisoned").get(peer).unwrap_or(&0)
    }

    pub fn is_over_threshold(&self, peer: &NeighborId) -> bool {
        self.count(peer) >= VIOLATION_THRESHOLD
    }

    pub fn reset(&self, peer: &NeighborId) {
        self.counts.lock().expect("violations mutex poisoned").remove(peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crosses_threshold_after_enough_violations() {
        let violations = PeerViolations::new();
        let peer = NeighborId::from("bad-peer");
        for _ in 0..VIOLATION_THRESHOLD - 1 {
            violations.record(&peer);
        }
        assert!(!violations.is_over_threshold(&peer));
        violations.record(&peer);
        assert!(violations.is_over_threshold(&peer));
    }

    #[test]
    fn reset_clears_the_counter() {
        let violations = PeerViolations::new();
        let peer = NeighborId::from("flaky");
        for _ in 0..VIOLATION_THRESHOLD {
            violations.record(&peer);
        }
        assert!(violations.is_over_threshold(&peer));
        violations.reset(&peer);
        assert_eq!(violations.count(&peer), 0);
    }
}
