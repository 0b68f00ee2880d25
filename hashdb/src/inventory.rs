use chrono::Utc;
use sqlx::Row;

use crate::error::{Error, Result};
use crate::store::HashDb;
use crate::types::{CodecHints, EntrySource, InventoryEntry, InventoryStatus};
use fingerprint::{Fingerprint, Kind};

impl HashDb {
    /// Records (or re-records) that `peer_id` offers a file at `path`/`size`.
    /// Freshly discovered rows start `status = none`.
    pub async fn upsert_inventory(
        &self,
        peer_id: &str,
        path: &str,
        size: u64,
    ) -> Result<String> {
        let file_id = crate::types::file_id(peer_id, path, size);
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO inventory (file_id, peer_id, path, size, discovered_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'none')
             ON CONFLICT(file_id) DO UPDATE SET discovered_at = ?5",
        )
        .bind(&file_id)
        .bind(peer_id)
        .bind(path)
        .bind(size as i64)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(file_id)
    }

    /// Moves an inventory row directly between statuses that carry no
    /// fingerprint (`none` ⇄ `pending` ⇄ `failed`), e.g. when the backfill
    /// scheduler claims or fails a candidate.
    pub async fn mark_inventory_status(&self, file_id: &str, status: InventoryStatus) -> Result<()> {
        sqlx::query("UPDATE inventory SET status = ?1 WHERE file_id = ?2")
            .bind(status.as_str())
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Attaches a fingerprint result (success or failure taxonomy) to an
    /// existing inventory row.
    pub async fn set_inventory_fingerprint(
        &self,
        file_id: &str,
        status: InventoryStatus,
        fingerprint: Option<&Fingerprint>,
        source: Option<EntrySource>,
        codec_hints: CodecHints,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE inventory SET status = ?1, fingerprint_kind = ?2, fingerprint_bytes = ?3,
                 source = ?4, sample_rate_hz = ?5, channels = ?6, bits_per_sample = ?7, total_samples = ?8
             WHERE file_id = ?9",
        )
        .bind(status.as_str())
        .bind(fingerprint.map(|f| f.kind().to_string()))
        .bind(fingerprint.map(|f| f.bytes().to_vec()))
        .bind(source.map(|s| s.as_str()))
        .bind(codec_hints.sample_rate_hz)
        .bind(codec_hints.channels)
        .bind(codec_hints.bits_per_sample)
        .bind(codec_hints.total_samples.map(|v| v as i64))
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_inventory(&self, file_id: &str) -> Result<InventoryEntry> {
        let row = sqlx::query(
            "SELECT file_id, peer_id, path, size, discovered_at, status, fingerprint_kind,
                 fingerprint_bytes, source, sample_rate_hz, channels, bits_per_sample, total_samples
             FROM inventory WHERE file_id = ?1",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::InventoryNotFound(file_id.to_string()))?;
        row_to_entry(row)
    }

    /// Inventory rows not yet fingerprinted, for the backfill scheduler.
    pub async fn list_unhashed_inventory(&self, limit: u32) -> Result<Vec<InventoryEntry>> {
        let rows = sqlx::query(
            "SELECT file_id, peer_id, path, size, discovered_at, status, fingerprint_kind,
                 fingerprint_bytes, source, sample_rate_hz, channels, bits_per_sample, total_samples
             FROM inventory WHERE status = 'none' ORDER BY discovered_at ASC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_entry).collect()
    }

    /// Inventory rows eligible for a backfill probe: `status = none`, owning
    /// peer does not already expose hashes via mesh (`HasFingerprintDB`), and
    /// owning peer is under today's per-peer probe cap.
    pub async fn backfill_candidates(
        &self,
        limit: u32,
        max_per_peer_per_day: u32,
    ) -> Result<Vec<InventoryEntry>> {
        let today = Utc::now().date_naive().to_string();
        let has_fingerprint_db = crate::types::Capabilities::HAS_FINGERPRINT_DB.bits();
        let rows = sqlx::query(
            "SELECT inventory.file_id, inventory.peer_id, path, size, discovered_at, status,
                 fingerprint_kind, fingerprint_bytes, source, sample_rate_hz, channels,
                 bits_per_sample, total_samples
             FROM inventory
             JOIN peers ON peers.peer_id = inventory.peer_id
             WHERE inventory.status = 'none'
               AND (peers.capabilities & ?1) = 0
               AND (CASE WHEN peers.backfill_reset_day = ?2 THEN peers.backfill_today ELSE 0 END) < ?3
             ORDER BY discovered_at ASC
             LIMIT ?4",
        )
        .bind(has_fingerprint_db)
        .bind(today)
        .bind(max_per_peer_per_day)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_entry).collect()
    }

    /// Peers that have offered a file whose fingerprint matches `key`
    /// (joins through [`crate::normalize::fingerprint_key`] externally).
    pub async fn inventory_by_fingerprint(
        &self,
        kind: Kind,
        bytes: &[u8],
    ) -> Result<Vec<InventoryEntry>> {
        let rows = sqlx::query(
            "SELECT file_id, peer_id, path, size, discovered_at, status, fingerprint_kind,
                 fingerprint_bytes, source, sample_rate_hz, channels, bits_per_sample, total_samples
             FROM inventory WHERE fingerprint_kind = ?1 AND fingerprint_bytes = ?2",
        )
        .bind(kind.to_string())
        .bind(bytes)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: sqlx::sqlite::SqliteRow) -> Result<InventoryEntry> {
    let discovered_at: String = row.try_get("discovered_at")?;
    let status_str: String = row.try_get("status")?;
    let status = InventoryStatus::parse(&status_str)
        .ok_or_else(|| Error::CorruptRow(format!("unknown inventory status {status_str}")))?;

    let fingerprint_kind: Option<String> = row.try_get("fingerprint_kind")?;
    let fingerprint_bytes: Option<Vec<u8>> = row.try_get("fingerprint_bytes")?;
    let fingerprint = match (fingerprint_kind, fingerprint_bytes) {
        (Some(kind_str), Some(bytes)) => Some(parse_fingerprint(&kind_str, bytes)?),
        _ => None,
    };

    let source_str: Option<String> = row.try_get("source")?;
    let source = source_str
        .map(|s| {
            EntrySource::parse(&s).ok_or_else(|| Error::CorruptRow(format!("unknown source {s}")))
        })
        .transpose()?;

    Ok(InventoryEntry {
        file_id: row.try_get("file_id")?,
        peer_id: row.try_get("peer_id")?,
        path: row.try_get("path")?,
        size: row.try_get::<i64, _>("size")? as u64,
        discovered_at: chrono::DateTime::parse_from_rfc3339(&discovered_at)
            .map_err(|e| Error::CorruptRow(e.to_string()))?
            .with_timezone(&Utc),
        status,
        fingerprint,
        source,
        codec_hints: CodecHints {
            sample_rate_hz: row.try_get::<Option<i64>, _>("sample_rate_hz")?.map(|v| v as u32),
            channels: row.try_get::<Option<i64>, _>("channels")?.map(|v| v as u8),
            bits_per_sample: row
                .try_get::<Option<i64>, _>("bits_per_sample")?
                .map(|v| v as u8),
            total_samples: row
                .try_get::<Option<i64>, _>("total_samples")?
                .map(|v| v as u64),
        },
    })
}

pub(crate) fn parse_fingerprint(kind_str: &str, bytes: Vec<u8>) -> Result<Fingerprint> {
    let kind = match kind_str {
        "flac_streaminfo_md5" => Kind::FlacStreamInfoMd5,
        "sha_256_prefix" => Kind::Sha256Prefix,
        other => return Err(Error::CorruptRow(format!("unknown fingerprint kind {other}"))),
    };
    let expected = match kind {
        Kind::FlacStreamInfoMd5 => 16,
        Kind::Sha256Prefix => 32,
    };
    if bytes.len() != expected {
        return Err(Error::InvalidFingerprintLen {
            expected,
            got: bytes.len(),
        });
    }
    Ok(Fingerprint::from_parts(kind, bytes))
}
