use thiserror::Error;

/// Errors surfaced by the hash database.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("inventory row not found for file_id {0}")]
    InventoryNotFound(String),

    #[error("peer not found: {0}")]
    PeerNotFound(String),

    #[error("invalid fingerprint bytes: expected {expected} bytes, got {got}")]
    InvalidFingerprintLen { expected: usize, got: usize },

    #[error("corrupt row data: {0}")]
    CorruptRow(String),
}

pub type Result<T> = std::result::Result<T, Error>;
