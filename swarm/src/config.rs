use std::time::Duration;

/// Tuning knobs for a swarm download (spec section 6, `swarm.*` keys).
#[derive(Clone, Copy, Debug)]
pub struct SwarmConfig {
    pub default_chunk_size: u64,
    pub min_worker_bps: u64,
    pub slow_window: Duration,
    pub max_consecutive_failures: u32,
    pub max_retry_rounds: u32,
    pub retry_semaphore: usize,
    /// How long a worker sits out after cycling off a slow chunk before it
    /// rejoins the queue. Not separately named in the spec; chosen equal to
    /// `slow_window` so a worker gets one full observation window to prove
    /// itself before being judged again.
    pub slow_cooldown: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            default_chunk_size: 1024 * 1024,
            min_worker_bps: 5 * 1024,
            slow_window: Duration::from_secs(15),
            max_consecutive_failures: 3,
            max_retry_rounds: 3,
            retry_semaphore: 10,
            slow_cooldown: Duration::from_secs(15),
        }
    }
}
