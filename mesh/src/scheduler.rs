//! Rate limiting for sync sessions: at most one full sync per neighbor per
//! `sync_interval`, and at most `max_peers_per_cycle` new sessions started
//! per scheduling cycle (spec section 4.5, "Rate limits").

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::config::MeshConfig;
use crate::neighbor::NeighborId;

pub struct MeshScheduler {
    config: MeshConfig,
    last_synced: Mutex<HashMap<NeighborId, Instant>>,
}

impl MeshScheduler {
    pub fn new(config: MeshConfig) -> Self {
        Self {
            config,
            last_synced: Mutex::new(HashMap::new()),
        }
    }

    /// From `neighbors`, picks up to `max_peers_per_cycle` that have not
    /// synced within `sync_interval` of `now`, preserving input order.
    pub fn select_cycle(&self, neighbors: &[NeighborId], now: Instant) -> Vec<NeighborId> {
        let last_synced = self.last_synced.lock().expect("scheduler mutex poisoned");
        neighbors
            .iter()
            .filter(|peer| match last_synced.get(*peer) {
                Some(last) => now.saturating_duration_since(*last) >= self.config.sync_interval,
                None => true,
            })
            .take(self.config.max_peers_per_cycle as usize)
            .cloned()
            .collect()
    }

    pub fn record_synced(&self, peer: &NeighborId, at: Instant) {
        self.last_synced
            .lock()
            .expect("scheduler mutex poisoned")
            .insert(peer.clone(), at);
    }
}
