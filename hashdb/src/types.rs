use bitflags::bitflags;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

bitflags! {
    /// Capability bits a peer may advertise (spec section 3).
    #[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
    pub struct Capabilities: i64 {
        const SUPPORTS_MESH          = 0b0000_0001;
        const SUPPORTS_HASH_EXCHANGE = 0b0000_0010;
        const SUPPORTS_PARTIAL_RANGE = 0b0000_0100;
        const SUPPORTS_BACKFILL_PROBE = 0b0000_1000;
        const HAS_FINGERPRINT_DB     = 0b0001_0000;
    }
}

/// A peer known to this node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Peer {
    pub peer_id: String,
    pub capabilities: Capabilities,
    pub client_version: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub last_capability_check: Option<DateTime<Utc>>,
    pub backfill_today: u32,
    pub backfill_reset_day: NaiveDate,
}

/// The lifecycle state of an [`InventoryEntry`]'s fingerprint.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum InventoryStatus {
    None,
    Known,
    Pending,
    Failed,
}

impl InventoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryStatus::None => "none",
            InventoryStatus::Known => "known",
            InventoryStatus::Pending => "pending",
            InventoryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(InventoryStatus::None),
            "known" => Some(InventoryStatus::Known),
            "pending" => Some(InventoryStatus::Pending),
            "failed" => Some(InventoryStatus::Failed),
            _ => None,
        }
    }
}

/// Where a fingerprint value came from.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum EntrySource {
    LocalScan,
    PeerGossip,
    BackfillProbe,
    Download,
}

impl EntrySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySource::LocalScan => "local-scan",
            EntrySource::PeerGossip => "peer-gossip",
            EntrySource::BackfillProbe => "backfill-probe",
            EntrySource::Download => "download",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local-scan" => Some(EntrySource::LocalScan),
            "peer-gossip" => Some(EntrySource::PeerGossip),
            "backfill-probe" => Some(EntrySource::BackfillProbe),
            "download" => Some(EntrySource::Download),
            _ => None,
        }
    }
}

/// Optional codec metadata carried on an inventory row.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CodecHints {
    pub sample_rate_hz: Option<u32>,
    pub channels: Option<u8>,
    pub bits_per_sample: Option<u8>,
    pub total_samples: Option<u64>,
}

impl From<fingerprint::CodecMeta> for CodecHints {
    fn from(meta: fingerprint::CodecMeta) -> Self {
        CodecHints {
            sample_rate_hz: Some(meta.sample_rate_hz),
            channels: Some(meta.channels),
            bits_per_sample: Some(meta.bits_per_sample),
            total_samples: Some(meta.total_samples),
        }
    }
}

/// A per-peer, per-file record: peer P offers file F at path X with size S.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub file_id: String,
    pub peer_id: String,
    pub path: String,
    pub size: u64,
    pub discovered_at: DateTime<Utc>,
    pub status: InventoryStatus,
    pub fingerprint: Option<fingerprint::Fingerprint>,
    pub source: Option<EntrySource>,
    pub codec_hints: CodecHints,
}

impl InventoryEntry {
    /// `status = known` implies `fingerprint` and `source` are both present.
    pub fn invariant_holds(&self) -> bool {
        if self.status == InventoryStatus::Known {
            self.fingerprint.is_some() && self.source.is_some()
        } else {
            true
        }
    }
}

/// `file_id = H(peer_id ‖ path ‖ size)`.
pub fn file_id(peer_id: &str, path: &str, size: u64) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(peer_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(path.as_bytes());
    hasher.update(b"\0");
    hasher.update(size.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// A content-addressed, global fingerprint record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub key: String,
    pub fingerprint: fingerprint::Fingerprint,
    pub size: u64,
    pub meta_flags: u32,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub seq_id: u64,
    pub verified: bool,
    pub conflict_count: u32,
}

/// Per-neighbor gossip progress.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeshPeerState {
    pub peer_id: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_seq_seen: u64,
}

/// A terminal-state summary of a [`crate` caller's] swarm download job,
/// persisted so `job_status` survives process restart (see SPEC_FULL.md C.1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub filename: String,
    pub size: u64,
    pub state: String,
    pub bytes_downloaded: u64,
    pub completed_chunks: u32,
    pub total_chunks: u32,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub finished_at: DateTime<Utc>,
}
