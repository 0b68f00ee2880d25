use chrono::{NaiveDate, Utc};
use sqlx::Row;

use crate::error::{Error, Result};
use crate::store::HashDb;
use crate::types::{Capabilities, Peer};

impl HashDb {
    /// Inserts a peer, or updates `last_seen` (and capabilities, if given)
    /// for an existing one.
    pub async fn upsert_peer(
        &self,
        peer_id: &str,
        capabilities: Option<Capabilities>,
        client_version: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let today = now.date_naive();
        sqlx::query(
            "INSERT INTO peers (peer_id, capabilities, client_version, last_seen, backfill_today, backfill_reset_day)
             VALUES (?1, COALESCE(?2, 0), ?3, ?4, 0, ?5)
             ON CONFLICT(peer_id) DO UPDATE SET
                 capabilities = COALESCE(?2, peers.capabilities),
                 client_version = COALESCE(?3, peers.client_version),
                 last_seen = ?4",
        )
        .bind(peer_id)
        .bind(capabilities.map(|c| c.bits()))
        .bind(client_version)
        .bind(now.to_rfc3339())
        .bind(today.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records the outcome of a capability discovery probe (SPEC_FULL.md C.1).
    pub async fn record_capability_check(
        &self,
        peer_id: &str,
        capabilities: Capabilities,
    ) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE peers SET capabilities = ?1, last_capability_check = ?2 WHERE peer_id = ?3",
        )
        .bind(capabilities.bits())
        .bind(now.to_rfc3339())
        .bind(peer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// ORs `observed` into a peer's stored capability bits, leaving any bits
    /// already known from a prior check untouched. Unlike
    /// [`Self::record_capability_check`], this is for incidental capability
    /// signals picked up as a side effect of an unrelated interaction (a
    /// mesh session, a successful ranged download) rather than a dedicated
    /// probe, so it must never clobber what's already on record.
    pub async fn merge_capabilities(&self, peer_id: &str, observed: Capabilities) -> Result<()> {
        if observed.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        sqlx::query(
            "UPDATE peers SET capabilities = capabilities | ?1, last_capability_check = ?2 WHERE peer_id = ?3",
        )
        .bind(observed.bits())
        .bind(now.to_rfc3339())
        .bind(peer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_peer(&self, peer_id: &str) -> Result<Peer> {
        let row = sqlx::query(
            "SELECT peer_id, capabilities, client_version, last_seen, last_capability_check, backfill_today, backfill_reset_day
             FROM peers WHERE peer_id = ?1",
        )
        .bind(peer_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::PeerNotFound(peer_id.to_string()))?;
        Ok(row_to_peer(row)?)
    }

    pub async fn list_peers(&self) -> Result<Vec<Peer>> {
        let rows = sqlx::query(
            "SELECT peer_id, capabilities, client_version, last_seen, last_capability_check, backfill_today, backfill_reset_day
             FROM peers",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_peer).collect()
    }

    /// Deletes peers (and their inventory rows) not seen in over `max_age`.
    /// Invoked by the core's periodic maintenance tick (SPEC_FULL.md C.3).
    pub async fn prune_unseen(&self, max_age: chrono::Duration) -> Result<u64> {
        let cutoff = (Utc::now() - max_age).to_rfc3339();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM inventory WHERE peer_id IN (SELECT peer_id FROM peers WHERE last_seen < ?1)")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM peers WHERE last_seen < ?1")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Increments today's backfill probe counter for `peer_id`, resetting it
    /// first if the stored reset day has rolled over. Returns the new count.
    pub async fn increment_backfill_count(&self, peer_id: &str) -> Result<u32> {
        let today = Utc::now().date_naive();
        let peer = self.get_peer(peer_id).await?;
        let count = if peer.backfill_reset_day == today {
            peer.backfill_today + 1
        } else {
            1
        };
        sqlx::query(
            "UPDATE peers SET backfill_today = ?1, backfill_reset_day = ?2 WHERE peer_id = ?3",
        )
        .bind(count)
        .bind(today.to_string())
        .bind(peer_id)
        .execute(&self.pool)
        .await?;
        Ok(count)
    }
}

fn row_to_peer(row: sqlx::sqlite::SqliteRow) -> Result<Peer> {
    let capabilities_bits: i64 = row.try_get("capabilities")?;
    let last_seen: String = row.try_get("last_seen")?;
    let last_capability_check: Option<String> = row.try_get("last_capability_check")?;
    let backfill_reset_day: String = row.try_get("backfill_reset_day")?;
    Ok(Peer {
        peer_id: row.try_get("peer_id")?,
        capabilities: Capabilities::from_bits_truncate(capabilities_bits),
        client_version: row.try_get("client_version")?,
        last_seen: chrono::DateTime::parse_from_rfc3339(&last_seen)
            .map_err(|e| Error::CorruptRow(e.to_string()))?
            .with_timezone(&Utc),
        last_capability_check: last_capability_check
            .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| Error::CorruptRow(e.to_string()))?,
        backfill_today: row.try_get::<i64, _>("backfill_today")? as u32,
        backfill_reset_day: NaiveDate::parse_from_str(&backfill_reset_day, "%Y-%m-%d")
            .map_err(|e| Error::CorruptRow(e.to_string()))?,
    })
}
