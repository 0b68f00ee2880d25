use chrono::Utc;
use sqlx::Row;

use crate::error::{Error, Result};
use crate::inventory::parse_fingerprint;
use crate::store::HashDb;
use crate::types::FingerprintEntry;
use fingerprint::Fingerprint;

impl HashDb {
    /// Looks up a fingerprint by its normalized `(basename, size)` key.
    pub async fn lookup_fingerprint(&self, key: &str) -> Result<Option<FingerprintEntry>> {
        let row = sqlx::query(
            "SELECT key, fingerprint_kind, fingerprint_bytes, size, meta_flags,
                 first_seen_at, last_updated_at, seq_id, verified, conflict_count
             FROM fingerprints WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_entry).transpose()
    }

    /// Stores a locally-derived fingerprint (from a download or local probe).
    /// Always wins over an existing row, since local observations are
    /// first-hand. Only bumps the global sequence counter on insert or when
    /// the stored fingerprint bytes actually change; a same-bytes re-store
    /// is an idempotent no-op for `seq_id`.
    pub async fn store_fingerprint(
        &self,
        key: &str,
        fingerprint: &Fingerprint,
        size: u64,
        meta_flags: u32,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let existing = sqlx::query(
            "SELECT fingerprint_kind, fingerprint_bytes, seq_id FROM fingerprints WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        let unchanged = match &existing {
            Some(row) => {
                let existing_kind: String = row.try_get("fingerprint_kind")?;
                let existing_bytes: Vec<u8> = row.try_get("fingerprint_bytes")?;
                existing_kind == fingerprint.kind().to_string() && existing_bytes == fingerprint.bytes()
            }
            None => false,
        };

        let now = Utc::now().to_rfc3339();
        let seq_id = if unchanged {
            existing.unwrap().try_get::<i64, _>("seq_id")? as u64
        } else {
            next_seq_id(&mut tx).await?
        };

        if unchanged {
            sqlx::query(
                "UPDATE fingerprints SET size = ?1, meta_flags = ?2, last_updated_at = ?3, verified = 1
                 WHERE key = ?4",
            )
            .bind(size as i64)
            .bind(meta_flags as i64)
            .bind(&now)
            .bind(key)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO fingerprints
                     (key, fingerprint_kind, fingerprint_bytes, size, meta_flags,
                      first_seen_at, last_updated_at, seq_id, verified, conflict_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, 1, 0)
                 ON CONFLICT(key) DO UPDATE SET
                     fingerprint_kind = ?2, fingerprint_bytes = ?3, size = ?4,
                     meta_flags = ?5, last_updated_at = ?6, seq_id = ?7, verified = 1",
            )
            .bind(key)
            .bind(fingerprint.kind().to_string())
            .bind(fingerprint.bytes().to_vec())
            .bind(size as i64)
            .bind(meta_flags as i64)
            .bind(&now)
            .bind(seq_id as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(seq_id)
    }

    /// Merges a fingerprint learned via gossip. Applies first-seen-wins: an
    /// existing row that has been locally verified is never overwritten by a
    /// gossiped value, even one with a newer timestamp. An existing
    /// unverified row IS replaced, and the conflict is counted if the two
    /// values disagree.
    pub async fn merge_from_gossip(
        &self,
        key: &str,
        fingerprint: &Fingerprint,
        size: u64,
        meta_flags: u32,
        remote_seq_id: u64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let existing = sqlx::query(
            "SELECT fingerprint_kind, fingerprint_bytes, verified, conflict_count
             FROM fingerprints WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        let now = Utc::now().to_rfc3339();

        match existing {
            None => {
                let seq_id = next_seq_id(&mut tx).await?;
                sqlx::query(
                    "INSERT INTO fingerprints
                         (key, fingerprint_kind, fingerprint_bytes, size, meta_flags,
                          first_seen_at, last_updated_at, seq_id, verified, conflict_count)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, 0, 0)",
                )
                .bind(key)
                .bind(fingerprint.kind().to_string())
                .bind(fingerprint.bytes().to_vec())
                .bind(size as i64)
                .bind(meta_flags as i64)
                .bind(&now)
                .bind(seq_id as i64)
                .execute(&mut *tx)
                .await?;
            }
            Some(row) => {
                let verified: bool = row.try_get::<i64, _>("verified")? != 0;
                let existing_kind: String = row.try_get("fingerprint_kind")?;
                let existing_bytes: Vec<u8> = row.try_get("fingerprint_bytes")?;
                let disagrees = existing_kind != fingerprint.kind().to_string()
                    || existing_bytes != fingerprint.bytes();

                if verified {
                    if disagrees {
                        sqlx::query(
                            "UPDATE fingerprints SET conflict_count = conflict_count + 1 WHERE key = ?1",
                        )
                        .bind(key)
                        .execute(&mut *tx)
                        .await?;
                    }
                } else if disagrees {
                    let conflict_count: i64 = row.try_get("conflict_count")?;
                    let seq_id = next_seq_id(&mut tx).await?;
                    sqlx::query(
                        "UPDATE fingerprints SET fingerprint_kind = ?1, fingerprint_bytes = ?2,
                             size = ?3, meta_flags = ?4, last_updated_at = ?5, seq_id = ?6, conflict_count = ?7
                         WHERE key = ?8",
                    )
                    .bind(fingerprint.kind().to_string())
                    .bind(fingerprint.bytes().to_vec())
                    .bind(size as i64)
                    .bind(meta_flags as i64)
                    .bind(&now)
                    .bind(seq_id as i64)
                    .bind(conflict_count + 1)
                    .bind(key)
                    .execute(&mut *tx)
                    .await?;
                }
                // Unverified row, identical bytes: idempotent no-op, seq_id untouched.
            }
        }
        tx.commit().await?;
        let _ = remote_seq_id;
        Ok(())
    }

    /// Fingerprint entries with `seq_id > since`, ordered by `seq_id`, for
    /// gossip delta exchange.
    pub async fn entries_since(&self, since: u64, limit: u32) -> Result<Vec<FingerprintEntry>> {
        let rows = sqlx::query(
            "SELECT key, fingerprint_kind, fingerprint_bytes, size, meta_flags,
                 first_seen_at, last_updated_at, seq_id, verified, conflict_count
             FROM fingerprints WHERE seq_id > ?1 ORDER BY seq_id ASC LIMIT ?2",
        )
        .bind(since as i64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_entry).collect()
    }

    pub async fn latest_seq_id(&self) -> Result<u64> {
        let row = sqlx::query("SELECT value FROM seq_counter WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("value")? as u64)
    }
}

async fn next_seq_id(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>) -> Result<u64> {
    sqlx::query("UPDATE seq_counter SET value = value + 1 WHERE id = 1")
        .execute(&mut **tx)
        .await?;
    let row = sqlx::query("SELECT value FROM seq_counter WHERE id = 1")
        .fetch_one(&mut **tx)
        .await?;
    Ok(row.try_get::<i64, _>("value")? as u64)
}

fn row_to_entry(row: sqlx::sqlite::SqliteRow) -> Result<FingerprintEntry> {
    let fingerprint_kind: String = row.try_get("fingerprint_kind")?;
    let fingerprint_bytes: Vec<u8> = row.try_get("fingerprint_bytes")?;
    let first_seen_at: String = row.try_get("first_seen_at")?;
    let last_updated_at: String = row.try_get("last_updated_at")?;
    Ok(FingerprintEntry {
        key: row.try_get("key")?,
        fingerprint: parse_fingerprint(&fingerprint_kind, fingerprint_bytes)?,
        size: row.try_get::<i64, _>("size")? as u64,
        meta_flags: row.try_get::<i64, _>("meta_flags")? as u32,
        first_seen_at: chrono::DateTime::parse_from_rfc3339(&first_seen_at)
            .map_err(|e| Error::CorruptRow(e.to_string()))?
            .with_timezone(&Utc),
        last_updated_at: chrono::DateTime::parse_from_rfc3339(&last_updated_at)
            .map_err(|e| Error::CorruptRow(e.to_string()))?
            .with_timezone(&Utc),
        seq_id: row.try_get::<i64, _>("seq_id")? as u64,
        verified: row.try_get::<i64, _>("verified")? != 0,
        conflict_count: row.try_get::<i64, _>("conflict_count")? as u32,
    })
}
