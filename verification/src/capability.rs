//! Peer capability discovery as a side effect of ordinary transfer traffic
//! (SPEC_FULL.md C.1).
//!
//! [`TransferClient`] never advertises a peer's capability bits directly,
//! so these are inferred from how a peer actually answers a request rather
//! than fetched with a dedicated call: a successful ranged download implies
//! [`Capabilities::SUPPORTS_PARTIAL_RANGE`].

use hashdb::types::Capabilities;
use hashdb::HashDb;

use crate::client::{PeerId, TransferError};
use crate::error::Result;

/// Infers capability bits observable from the outcome of a single download
/// attempt. Yields an empty set when nothing can be concluded (a
/// zero-offset request proves nothing about range support either way).
pub fn infer_from_download(start_offset: u64, outcome: &std::result::Result<u64, TransferError>) -> Capabilities {
    if start_offset > 0 && outcome.is_ok() {
        Capabilities::SUPPORTS_PARTIAL_RANGE
    } else {
        Capabilities::empty()
    }
}

/// Infers capability bits from a download outcome and merges them into
/// `peer`'s stored record, leaving bits already on record untouched.
pub async fn observe_download(
    hash_db: &HashDb,
    peer: &PeerId,
    start_offset: u64,
    outcome: &std::result::Result<u64, TransferError>,
) -> Result<()> {
    let observed = infer_from_download(start_offset, outcome);
    hash_db.merge_capabilities(peer.as_str(), observed).await?;
    Ok(())
}
