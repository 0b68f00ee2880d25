use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("hash database error: {0}")]
    Store(#[from] hashdb::Error),

    #[error("cycle was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
