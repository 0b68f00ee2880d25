use std::time::Duration;

/// Tuning knobs for gossip (spec section 6, `mesh.*` keys).
#[derive(Clone, Copy, Debug)]
pub struct MeshConfig {
    pub sync_interval: Duration,
    pub max_entries_per_sync: u32,
    pub max_peers_per_cycle: u32,
    pub max_pair_batches: u32,
    /// How long a session waits for a response before treating the request
    /// as stalled. Not separately named in the spec's config key list, which
    /// only specifies retry-once-then-end-session behavior.
    pub recv_timeout: Duration,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(30 * 60),
            max_entries_per_sync: 500,
            max_peers_per_cycle: 5,
            max_pair_batches: 10,
            recv_timeout: Duration::from_secs(10),
        }
    }
}

/// The protocol version this node's HELLO advertises.
pub const PROTOCOL_VERSION: u32 = 1;
