//! The per-connection framing the core depends on but does not implement:
//! "bidirectional message framing provided by the (out-of-core) secure
//! transport" (spec section 4.5). `recv` returns one already-delineated
//! frame's bytes; [`crate::wire::Message::decode`] interprets them.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait MeshTransport: Send {
    async fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Waits for the next frame. Returns `Ok(None)` if the peer closed the
    /// connection cleanly.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>>;
}
