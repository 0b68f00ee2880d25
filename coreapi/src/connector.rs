//! The external collaborator mesh sessions are dialed over.
//!
//! `mesh::MeshTransport` is a per-session frame pipe with no notion of
//! "connect to this neighbor" — that half belongs to the host's network
//! layer, same as `verification::TransferClient` is host-supplied for
//! downloads (spec section 6). `MeshConnector` is the equivalent seam for
//! gossip: given a neighbor already known to support mesh (tracked via
//! `hashdb::types::Capabilities::SUPPORTS_MESH`), the host hands back a live
//! transport to sync over.

use async_trait::async_trait;
use mesh::{MeshTransport, NeighborId};

/// Errors a connector can report when a neighbor can't be reached right now.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConnectError {
    #[error("neighbor {0} is unreachable")]
    Unreachable(NeighborId),

    #[error("connector transport error: {0}")]
    Transport(String),
}

/// Dials a live [`MeshTransport`] to a neighbor. Supplied by the host
/// application; this crate only ever calls [`Self::connect`].
#[async_trait]
pub trait MeshConnector: Send + Sync {
    async fn connect(&self, peer: &NeighborId) -> Result<Box<dyn MeshTransport>, ConnectError>;
}
