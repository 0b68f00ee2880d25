//! The external collaborator the core depends on but does not implement
//! (spec section 6: "TransferClient (consumed)").

use async_trait::async_trait;
use derive_more::{Display, From};
use tokio::io::AsyncWrite;

/// An opaque, network-unique peer identifier.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, From)]
pub struct PeerId(String);

impl PeerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId(s.to_string())
    }
}

/// A single search result entry, as reported by the host's file-sharing
/// network layer.
#[derive(Clone, Debug)]
pub struct SearchFile {
    pub path: String,
    pub size: u64,
}

/// Free slot / queue / throughput attributes a host reports for a peer,
/// used to bias worker scheduling decisions.
#[derive(Clone, Copy, Debug, Default)]
pub struct PeerAttributes {
    pub free_slot: bool,
    pub queue_length: u32,
    pub upload_speed_estimate_bps: Option<u64>,
}

/// Transport-level errors surfaced by a [`TransferClient`] call.
#[derive(Debug, thiserror::Error, Clone)]
#[non_exhaustive]
pub enum TransferError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("peer rejected start_offset {start_offset}")]
    RemoteRejected { start_offset: u64 },

    #[error("operation was cancelled")]
    Cancelled,
}

/// A transfer request's tuning knobs; distinct from HTTP-style options since
/// the underlying protocol is peer-to-peer.
#[derive(Clone, Copy, Debug, Default)]
pub struct DownloadOptions {
    pub timeout: Option<std::time::Duration>,
}

/// The abstract peer-to-peer transport the core is built atop. Supplied by
/// the host application; this crate only ever calls its methods.
///
/// The underlying transport historically insists on full-file transfers, so
/// callers requesting a byte range must be prepared for `start_offset > 0` to
/// come back as [`TransferError::RemoteRejected`] and must wrap `sink` in
/// something that itself enforces the requested bound (see `swarm`'s bounded
/// writer).
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Requests `[start_offset, start_offset + want)` (where `want` is
    /// implied by how much the caller reads from `sink` before closing it)
    /// from `peer`, writing received bytes into `sink`. Returns the number of
    /// bytes actually written.
    async fn download(
        &self,
        peer: &PeerId,
        remote_path: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        size: u64,
        start_offset: u64,
        options: DownloadOptions,
        cancel: &cancel::Token,
    ) -> Result<u64, TransferError>;

    /// Current scheduling-relevant attributes for `peer`.
    async fn peer_attributes(&self, peer: &PeerId) -> Result<PeerAttributes, TransferError>;
}
