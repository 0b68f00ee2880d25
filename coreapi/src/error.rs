use thiserror::Error;

/// Errors surfaced by the core façade (spec section 7, core-level).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("swarm job error: {0}")]
    Swarm(#[from] swarm::Error),

    #[error("verification error: {0}")]
    Verification(#[from] verification::Error),

    #[error("mesh error: {0}")]
    Mesh(#[from] mesh::Error),

    #[error("backfill error: {0}")]
    Backfill(#[from] backfill::Error),

    #[error("hash database error: {0}")]
    Store(#[from] hashdb::Error),

    #[error("unknown job id: {0}")]
    UnknownJob(String),

    #[error("unknown neighbor: {0}")]
    UnknownNeighbor(String),
}

pub type Result<T> = std::result::Result<T, Error>;
