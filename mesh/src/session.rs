//! A single gossip sync session with one neighbor (spec section 4.5,
//! "MeshSync"): HELLO exchange, then REQ_DELTA/PUSH_DELTA rounds bounded by
//! `max_pair_batches`, and REQ_KEY/RESP_KEY point lookups on request.

use hashdb::types::Capabilities;
use hashdb::HashDb;
use tracing::debug;

/// A peer that completes a HELLO exchange has, by construction, a gossip
/// endpoint backed by a fingerprint store.
fn mesh_peer_capabilities() -> Capabilities {
    Capabilities::SUPPORTS_MESH | Capabilities::SUPPORTS_HASH_EXCHANGE | Capabilities::HAS_FINGERPRINT_DB
}

async fn record_mesh_peer_seen(hash_db: &HashDb, peer: &NeighborId) -> Result<()> {
    hash_db.upsert_peer(peer.as_str(), None, None).await?;
    hash_db.merge_capabilities(peer.as_str(), mesh_peer_capabilities()).await?;
    Ok(())
}

use crate::config::{MeshConfig, PROTOCOL_VERSION};
use crate::error::{Error, Result};
use crate::neighbor::NeighborId;
use crate::transport::MeshTransport;
use crate::violations::PeerViolations;
use crate::wire::{encode_push_delta_capped, DeltaEntry, Message};

/// Outcome of one completed session, for scheduling and metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub entries_received: u32,
    pub batches_exchanged: u32,
}

/// Initiates a sync session as the active side: sends HELLO first, then
/// drives the REQ_DELTA loop. `cancel.check_cancel()` is polled between
/// network round-trips; cancelling closes the connection without poisoning
/// state learned from fully-processed batches.
pub async fn run_initiator(
    transport: &mut dyn MeshTransport,
    peer: &NeighborId,
    hash_db: &HashDb,
    config: &MeshConfig,
    violations: &PeerViolations,
    cancel: &cancel::Token,
) -> Result<SessionReport> {
    let local_latest = hash_db.latest_seq_id().await?;
    send(transport, &Message::Hello {
        client_id: peer.as_str().to_string(),
        protocol_version: PROTOCOL_VERSION,
        latest_local_seq: local_latest,
    })
    .await?;

    let peer_hello = match recv_timed(transport, config).await {
        Ok(Message::Hello { latest_local_seq, .. }) => latest_local_seq,
        Ok(_) => {
            violations.record(peer);
            return Err(Error::ProtocolViolation("expected HELLO first".to_string()));
        }
        Err(e) => return Err(e),
    };

    record_mesh_peer_seen(hash_db, peer).await?;

    let mut report = SessionReport::default();
    let mut watermark = hash_db.peer_last_seq_seen(peer.as_str()).await?;

    if peer_hello <= watermark {
        debug!(peer = %peer, watermark, "neighbor has nothing new to offer");
        return Ok(report);
    }

    for _ in 0..config.max_pair_batches {
        cancel.check_cancel().map_err(|_| Error::Cancelled)?;

        let entries = request_delta_with_retry(transport, config, watermark, peer, violations).await?;

        if entries.is_empty() {
            break;
        }

        let batch_len = entries.len() as u32;
        let max_seq = apply_batch(hash_db, &entries).await?;
        watermark = max_seq.max(watermark);
        hash_db.set_peer_last_seq_seen(peer.as_str(), watermark).await?;

        report.entries_received += batch_len;
        report.batches_exchanged += 1;

        if batch_len < config.max_entries_per_sync {
            break;
        }
    }

    Ok(report)
}

/// Serves a sync session as the passive side: waits for the peer's HELLO,
/// answers it, then services REQ_DELTA/REQ_KEY requests until the peer
/// closes the connection or a bound is hit.
pub async fn run_responder(
    transport: &mut dyn MeshTransport,
    peer: &NeighborId,
    hash_db: &HashDb,
    config: &MeshConfig,
    violations: &PeerViolations,
    cancel: &cancel::Token,
) -> Result<SessionReport> {
    let local_latest = hash_db.latest_seq_id().await?;

    match recv_timed(transport, config).await {
        Ok(Message::Hello { .. }) => {}
        Ok(_) => {
            violations.record(peer);
            return Err(Error::ProtocolViolation("expected HELLO first".to_string()));
        }
        Err(e) => return Err(e),
    }

    send(transport, &Message::Hello {
        client_id: peer.as_str().to_string(),
        protocol_version: PROTOCOL_VERSION,
        latest_local_seq: local_latest,
    })
    .await?;

    record_mesh_peer_seen(hash_db, peer).await?;

    let mut report = SessionReport::default();

    for _ in 0..config.max_pair_batches {
        cancel.check_cancel().map_err(|_| Error::Cancelled)?;

        let request = match transport.recv().await? {
            Some(bytes) => Message::decode(&bytes)?,
            None => break,
        };

        match request {
            Message::ReqDelta { since_seq, max_entries } => {
                let limit = max_entries.min(config.max_entries_per_sync);
                let entries = hash_db.entries_since(since_seq, limit).await?;
                let delta_entries: Vec<DeltaEntry> = entries.into_iter().map(to_delta_entry).collect();
                let (frame, included) = encode_push_delta_capped(&delta_entries);
                transport.send(&frame).await?;
                report.batches_exchanged += 1;
                if included == 0 {
                    break;
                }
            }
            Message::ReqKey { key } => {
                let looked_up = hash_db.lookup_fingerprint(&key).await?;
                let response = Message::RespKey {
                    key,
                    fingerprint: looked_up.as_ref().map(|e| e.fingerprint.clone()),
                    size: looked_up.as_ref().map(|e| e.size),
                };
                send(transport, &response).await?;
            }
            _ => {
                violations.record(peer);
                return Err(Error::ProtocolViolation("unexpected message in responder role".to_string()));
            }
        }
    }

    Ok(report)
}

/// Issues a point lookup for a single key against `peer`, for on-demand
/// resolution outside the periodic sync cycle (spec section 4.5, REQ_KEY).
pub async fn request_key(
    transport: &mut dyn MeshTransport,
    key: &str,
    config: &MeshConfig,
) -> Result<Option<DeltaEntry>> {
    send(transport, &Message::ReqKey { key: key.to_string() }).await?;
    match recv_timed(transport, config).await? {
        Message::RespKey { key, fingerprint: Some(fingerprint), size: Some(size) } => Ok(Some(DeltaEntry {
            seq: 0,
            key,
            fingerprint,
            size,
            meta_flags: 0,
        })),
        Message::RespKey { fingerprint: None, .. } => Ok(None),
        other => Err(Error::ProtocolViolation(format!("unexpected reply to REQ_KEY: {other:?}"))),
    }
}

/// Sends one REQ_DELTA and waits for PUSH_DELTA. A stalled first attempt is
/// retried once per spec section 4.5 ("A stalled REQ_DELTA ... is retried
/// once per session") before the error is propagated to the caller.
async fn request_delta_with_retry(
    transport: &mut dyn MeshTransport,
    config: &MeshConfig,
    since_seq: u64,
    peer: &NeighborId,
    violations: &PeerViolations,
) -> Result<Vec<DeltaEntry>> {
    send(transport, &Message::ReqDelta { since_seq, max_entries: config.max_entries_per_sync }).await?;
    match recv_timed(transport, config).await {
        Ok(Message::PushDelta { entries }) => Ok(entries),
        Ok(_) => {
            violations.record(peer);
            Err(Error::ProtocolViolation("expected PUSH_DELTA".to_string()))
        }
        Err(Error::Timeout) => {
            debug!(peer = %peer, since_seq, "REQ_DELTA stalled, retrying once");
            send(transport, &Message::ReqDelta { since_seq, max_entries: config.max_entries_per_sync }).await?;
            match recv_timed(transport, config).await {
                Ok(Message::PushDelta { entries }) => Ok(entries),
                Ok(_) => {
                    violations.record(peer);
                    Err(Error::ProtocolViolation("expected PUSH_DELTA".to_string()))
                }
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

async fn apply_batch(hash_db: &HashDb, entries: &[DeltaEntry]) -> Result<u64> {
    let mut max_seq = 0u64;
    for entry in entries {
        hash_db
            .merge_from_gossip(&entry.key, &entry.fingerprint, entry.size, entry.meta_flags, entry.seq)
            .await?;
        max_seq = max_seq.max(entry.seq);
    }
    Ok(max_seq)
}

fn to_delta_entry(entry: hashdb::types::FingerprintEntry) -> DeltaEntry {
    DeltaEntry {
        seq: entry.seq_id,
        key: entry.key,
        fingerprint: entry.fingerprint,
        size: entry.size,
        meta_flags: entry.meta_flags,
    }
}

async fn send(transport: &mut dyn MeshTransport, message: &Message) -> Result<()> {
    let frame = message.encode()?;
    transport.send(&frame).await
}

/// Waits for the next frame, failing with [`Error::Timeout`] if the peer is
/// unresponsive past `recv_timeout`. The caller retries once at the
/// REQ_DELTA level before giving up on the whole session.
async fn recv_timed(transport: &mut dyn MeshTransport, config: &MeshConfig) -> Result<Message> {
    let bytes = tokio::time::timeout(config.recv_timeout, transport.recv())
        .await
        .map_err(|_| Error::Timeout)??;
    match bytes {
        Some(bytes) => Message::decode(&bytes),
        None => Err(Error::Transport("connection closed".to_string())),
    }
}
