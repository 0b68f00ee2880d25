//! Tuning knobs for every subsystem `Core` owns (spec section 6).
//!
//! Loading these from a config file or environment is the host's job (the
//! rendezvous/config-file layer is an external collaborator, spec section 1);
//! this module only documents and validates the keys the host is expected to
//! supply, mirroring how `vsi::config` shapes its own CLI-facing structs.

use std::time::Duration;

use clap::Parser;
use getset::CopyGetters;
use stable_eyre::Result;

/// `swarm.*` keys.
#[derive(Parser, Clone, Copy, Debug, CopyGetters)]
pub struct Swarm {
    /// `swarm.default_chunk_size`, in bytes.
    #[clap(long, default_value_t = 1024 * 1024)]
    #[getset(get_copy = "pub")]
    default_chunk_size: u64,

    /// `swarm.min_worker_bps`.
    #[clap(long, default_value_t = 5 * 1024)]
    #[getset(get_copy = "pub")]
    min_worker_bps: u64,

    /// `swarm.slow_window_seconds`.
    #[clap(long, default_value_t = 15)]
    slow_window_seconds: u64,

    /// `swarm.max_consecutive_failures`.
    #[clap(long, default_value_t = 3)]
    #[getset(get_copy = "pub")]
    max_consecutive_failures: u32,

    /// `swarm.max_retry_rounds`.
    #[clap(long, default_value_t = 3)]
    #[getset(get_copy = "pub")]
    max_retry_rounds: u32,

    /// `swarm.retry_semaphore`.
    #[clap(long, default_value_t = 10)]
    #[getset(get_copy = "pub")]
    retry_semaphore: usize,
}

impl Swarm {
    /// Validates that self is correctly formed.
    pub fn validate(self) -> Result<Self> {
        Ok(self)
    }

    pub fn slow_window(&self) -> Duration {
        Duration::from_secs(self.slow_window_seconds)
    }

    pub(crate) fn to_swarm_config(self) -> swarm::SwarmConfig {
        swarm::SwarmConfig {
            default_chunk_size: self.default_chunk_size,
            min_worker_bps: self.min_worker_bps,
            slow_window: self.slow_window(),
            max_consecutive_failures: self.max_consecutive_failures,
            max_retry_rounds: self.max_retry_rounds,
            retry_semaphore: self.retry_semaphore,
            slow_cooldown: self.slow_window(),
        }
    }
}

/// `mesh.*` keys.
#[derive(Parser, Clone, Copy, Debug, CopyGetters)]
pub struct Mesh {
    /// `mesh.sync_interval_seconds`.
    #[clap(long, default_value_t = 30 * 60)]
    sync_interval_seconds: u64,

    /// `mesh.max_entries_per_sync`.
    #[clap(long, default_value_t = 500)]
    #[getset(get_copy = "pub")]
    max_entries_per_sync: u32,

    /// `mesh.max_peers_per_cycle`.
    #[clap(long, default_value_t = 5)]
    #[getset(get_copy = "pub")]
    max_peers_per_cycle: u32,

    /// `mesh.max_pair_batches`.
    #[clap(long, default_value_t = 10)]
    #[getset(get_copy = "pub")]
    max_pair_batches: u32,
}

impl Mesh {
    /// Validates that self is correctly formed.
    pub fn validate(self) -> Result<Self> {
        Ok(self)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_seconds)
    }

    pub(crate) fn to_mesh_config(self) -> mesh::MeshConfig {
        mesh::MeshConfig {
            sync_interval: self.sync_interval(),
            max_entries_per_sync: self.max_entries_per_sync,
            max_peers_per_cycle: self.max_peers_per_cycle,
            max_pair_batches: self.max_pair_batches,
            ..mesh::MeshConfig::default()
        }
    }
}

/// `backfill.*` keys.
#[derive(Parser, Clone, Copy, Debug, CopyGetters)]
pub struct Backfill {
    /// `backfill.interval_seconds`.
    #[clap(long, default_value_t = 10 * 60)]
    interval_seconds: u64,

    /// `backfill.max_concurrent`.
    #[clap(long, default_value_t = 2)]
    #[getset(get_copy = "pub")]
    max_concurrent: u32,

    /// `backfill.max_per_peer_per_day`.
    #[clap(long, default_value_t = 10)]
    #[getset(get_copy = "pub")]
    max_per_peer_per_day: u32,

    /// `backfill.min_idle_seconds`.
    #[clap(long, default_value_t = 300)]
    min_idle_seconds: u64,
}

impl Backfill {
    /// Validates that self is correctly formed.
    pub fn validate(self) -> Result<Self> {
        Ok(self)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn min_idle(&self) -> Duration {
        Duration::from_secs(self.min_idle_seconds)
    }

    pub(crate) fn to_backfill_config(self) -> backfill::BackfillConfig {
        backfill::BackfillConfig {
            interval: self.interval(),
            max_concurrent: self.max_concurrent,
            max_per_peer_per_day: self.max_per_peer_per_day,
            min_idle: self.min_idle(),
            ..backfill::BackfillConfig::default()
        }
    }
}

/// `verification.*` keys.
#[derive(Parser, Clone, Copy, Debug, CopyGetters)]
pub struct Verification {
    /// `verification.probe_timeout_ms`.
    #[clap(long, default_value_t = 30_000)]
    probe_timeout_ms: u64,

    /// `verification.non_flac_prefix_bytes`. Documented for host parity with
    /// spec section 6; `fingerprint::NON_FLAC_PREFIX_BYTES` is a fixed policy
    /// constant in this implementation (changing a prefix bound after
    /// fingerprints already exist under it would split identical files into
    /// different keys), so this value is validated but not wired to it.
    #[clap(long, default_value_t = fingerprint::NON_FLAC_PREFIX_BYTES as u64)]
    #[getset(get_copy = "pub")]
    non_flac_prefix_bytes: u64,
}

impl Verification {
    /// Validates that self is correctly formed.
    pub fn validate(self) -> Result<Self> {
        Ok(self)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Every subsystem's tuning knobs, flattened into one parseable command
/// (spec section 6's full key enumeration).
#[derive(Parser, Clone, Copy, Debug)]
pub struct Config {
    #[clap(flatten)]
    pub swarm: Swarm,

    #[clap(flatten)]
    pub mesh: Mesh,

    #[clap(flatten)]
    pub backfill: Backfill,

    #[clap(flatten)]
    pub verification: Verification,
}

impl Config {
    /// Validates that self is correctly formed.
    pub fn validate(self) -> Result<Self> {
        Ok(Self {
            swarm: self.swarm.validate()?,
            mesh: self.mesh.validate()?,
            backfill: self.backfill.validate()?,
            verification: self.verification.validate()?,
        })
    }
}
