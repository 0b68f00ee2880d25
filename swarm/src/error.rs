use thiserror::Error;

/// Errors surfaced by a [`crate::Job`] (spec section 7).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("fewer than 2 verified sources for this file")]
    NoVerifiedSources,

    #[error("assembled file does not match expected fingerprint")]
    FinalHashMismatch,

    #[error("retry rounds exhausted with {remaining} chunk(s) unfinished")]
    ChunkExhaustion { remaining: usize },

    #[error("job was cancelled")]
    Cancelled,

    #[error("scratch/output I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("hash database error: {0}")]
    Store(#[from] hashdb::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
