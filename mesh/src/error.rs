use thiserror::Error;

/// Errors surfaced by a mesh gossip session (spec section 4.5 / 7).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A frame failed to decode, or decoded to a structurally invalid
    /// message. The connection must be closed and a violation recorded
    /// against the neighbor.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("encoded frame of {len} bytes exceeds the {cap}-byte cap")]
    FrameTooLarge { len: usize, cap: usize },

    #[error("no response within the session timeout")]
    Timeout,

    #[error("session was cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("hash database error: {0}")]
    Store(#[from] hashdb::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
