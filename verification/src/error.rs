use thiserror::Error;

/// The failure taxonomy for a single peer probe (spec section 4.2/7).
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum Error {
    #[error("probe timed out")]
    Timeout,

    #[error("peer rejected the request: {0}")]
    RemoteRejected(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("file too small for verification: size {size} < required prefix {required}")]
    FileTooSmallForVerification { size: u64, required: u64 },

    #[error("verification was cancelled")]
    Cancelled,
}

impl From<fingerprint::Error> for Error {
    fn from(e: fingerprint::Error) -> Self {
        match e {
            fingerprint::Error::MalformedHeader(msg) => Error::MalformedHeader(msg),
            fingerprint::Error::InvariantDigestSize => {
                Error::MalformedHeader("unexpected digest size".into())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
