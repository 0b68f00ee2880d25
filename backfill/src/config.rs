use std::time::Duration;

/// Tuning knobs for the backfill scheduler (spec section 6, `backfill.*`
/// keys).
#[derive(Clone, Copy, Debug)]
pub struct BackfillConfig {
    pub interval: Duration,
    pub max_concurrent: u32,
    pub max_per_peer_per_day: u32,
    pub min_idle: Duration,
    /// How many candidates one cycle pulls from HashDB at once. Named in
    /// spec section 4.6's prose ("up to 3 inventory candidates") but not
    /// given its own config key, so it rides along with `max_concurrent`
    /// rather than being independently configurable.
    pub candidates_per_cycle: u32,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
            max_concurrent: 2,
            max_per_peer_per_day: 10,
            min_idle: Duration::from_secs(300),
            candidates_per_cycle: 3,
        }
    }
}
