use chrono::Utc;
use sqlx::Row;

use crate::error::Result;
use crate::store::HashDb;
use crate::types::MeshPeerState;

impl HashDb {
    /// The last fingerprint `seq_id` we've recorded as synced from `peer_id`,
    /// or `0` if we've never synced with them.
    pub async fn peer_last_seq_seen(&self, peer_id: &str) -> Result<u64> {
        let row = sqlx::query("SELECT last_seq_seen FROM mesh_peer_state WHERE peer_id = ?1")
            .bind(peer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(|r| r.try_get::<i64, _>("last_seq_seen"))
            .transpose()?
            .unwrap_or(0) as u64)
    }

    pub async fn set_peer_last_seq_seen(&self, peer_id: &str, seq_id: u64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO mesh_peer_state (peer_id, last_sync_at, last_seq_seen)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(peer_id) DO UPDATE SET last_sync_at = ?2, last_seq_seen = ?3",
        )
        .bind(peer_id)
        .bind(&now)
        .bind(seq_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mesh_peer_state(&self, peer_id: &str) -> Result<Option<MeshPeerState>> {
        let row = sqlx::query(
            "SELECT peer_id, last_sync_at, last_seq_seen FROM mesh_peer_state WHERE peer_id = ?1",
        )
        .bind(peer_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            let last_sync_at: Option<String> = row.try_get("last_sync_at")?;
            Ok(MeshPeerState {
                peer_id: row.try_get("peer_id")?,
                last_sync_at: last_sync_at
                    .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
                    .transpose()
                    .map_err(|e: chrono::ParseError| crate::error::Error::CorruptRow(e.to_string()))?,
                last_seq_seen: row.try_get::<i64, _>("last_seq_seen")? as u64,
            })
        })
        .transpose()
    }
}
