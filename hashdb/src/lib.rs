//! The local content-addressed hash database (spec sections 3 and 4.4).
//!
//! Three kinds of state live here: per-peer [`types::Peer`] records, the
//! per-peer-per-file [`types::InventoryEntry`] table discovered by scans and
//! gossip, and the deduplicated, global [`types::FingerprintEntry`] table keyed
//! by [`normalize::fingerprint_key`]. A monotonic sequence counter orders
//! fingerprint writes for mesh delta sync.

pub mod error;
mod fingerprints;
mod inventory;
mod jobs;
mod mesh_state;
mod normalize;
mod peers;
mod store;
pub mod types;

pub use error::Error;
pub use normalize::{fingerprint_key, normalize};
pub use store::HashDb;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Capabilities, CodecHints, EntrySource, InventoryStatus};
    use fingerprint::{Fingerprint, Kind};

    async fn test_db() -> HashDb {
        HashDb::open_in_memory().await.expect("open in-memory db")
    }

    #[tokio::test]
    async fn upsert_and_fetch_peer_roundtrips() {
        let db = test_db().await;
        db.upsert_peer("peer-a", Some(Capabilities::SUPPORTS_MESH), Some("v1"))
            .await
            .unwrap();
        let peer = db.get_peer("peer-a").await.unwrap();
        assert_eq!(peer.peer_id, "peer-a");
        assert!(peer.capabilities.contains(Capabilities::SUPPORTS_MESH));
        assert_eq!(peer.client_version.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn merge_capabilities_ors_in_new_bits_without_losing_old_ones() {
        let db = test_db().await;
        db.upsert_peer("peer-a", Some(Capabilities::SUPPORTS_MESH), None)
            .await
            .unwrap();
        db.merge_capabilities("peer-a", Capabilities::SUPPORTS_PARTIAL_RANGE)
            .await
            .unwrap();
        let peer = db.get_peer("peer-a").await.unwrap();
        assert!(peer.capabilities.contains(Capabilities::SUPPORTS_MESH));
        assert!(peer.capabilities.contains(Capabilities::SUPPORTS_PARTIAL_RANGE));
        assert!(peer.last_capability_check.is_some());
    }

    #[tokio::test]
    async fn unknown_peer_errors() {
        let db = test_db().await;
        assert!(matches!(
            db.get_peer("ghost").await,
            Err(Error::PeerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn inventory_roundtrips_with_fingerprint() {
        let db = test_db().await;
        db.upsert_peer("peer-a", None, None).await.unwrap();
        let file_id = db
            .upsert_inventory("peer-a", "/music/song.flac", 4096)
            .await
            .unwrap();

        let fp = Fingerprint::from_parts(Kind::FlacStreamInfoMd5, vec![0xAB; 16]);
        db.set_inventory_fingerprint(
            &file_id,
            InventoryStatus::Known,
            Some(&fp),
            Some(EntrySource::LocalScan),
            CodecHints {
                sample_rate_hz: Some(44_100),
                channels: Some(2),
                bits_per_sample: Some(16),
                total_samples: Some(0),
            },
        )
        .await
        .unwrap();

        let entry = db.get_inventory(&file_id).await.unwrap();
        assert_eq!(entry.status, InventoryStatus::Known);
        assert!(entry.invariant_holds());
        assert_eq!(entry.fingerprint.unwrap(), fp);
    }

    #[tokio::test]
    async fn store_fingerprint_bumps_seq_id() {
        let db = test_db().await;
        let fp = Fingerprint::from_parts(Kind::Sha256Prefix, vec![1u8; 32]);
        let key = fingerprint_key("song.mp3", 1000);
        let seq1 = db.store_fingerprint(&key, &fp, 1000, 0).await.unwrap();
        let fp2 = Fingerprint::from_parts(Kind::Sha256Prefix, vec![2u8; 32]);
        let seq2 = db.store_fingerprint(&key, &fp2, 1000, 0).await.unwrap();
        assert!(seq2 > seq1);
        assert_eq!(db.latest_seq_id().await.unwrap(), seq2);

        let entry = db.lookup_fingerprint(&key).await.unwrap().unwrap();
        assert!(entry.verified);
        assert_eq!(entry.fingerprint, fp2);
    }

    #[tokio::test]
    async fn storing_the_same_bytes_twice_does_not_bump_seq_id() {
        let db = test_db().await;
        let fp = Fingerprint::from_parts(Kind::Sha256Prefix, vec![1u8; 32]);
        let key = fingerprint_key("song.mp3", 1000);
        let seq1 = db.store_fingerprint(&key, &fp, 1000, 0).await.unwrap();
        let seq2 = db.store_fingerprint(&key, &fp, 1000, 0).await.unwrap();
        assert_eq!(seq1, seq2);
        assert_eq!(db.latest_seq_id().await.unwrap(), seq1);

        let entry = db.lookup_fingerprint(&key).await.unwrap().unwrap();
        assert_eq!(entry.seq_id, seq1);
        assert_eq!(entry.fingerprint, fp);
    }

    #[tokio::test]
    async fn gossip_never_overwrites_verified_local_entry() {
        let db = test_db().await;
        let key = fingerprint_key("song.mp3", 1000);
        let local = Fingerprint::from_parts(Kind::Sha256Prefix, vec![1u8; 32]);
        db.store_fingerprint(&key, &local, 1000, 0).await.unwrap();

        let gossiped = Fingerprint::from_parts(Kind::Sha256Prefix, vec![9u8; 32]);
        db.merge_from_gossip(&key, &gossiped, 1000, 0, 42).await.unwrap();

        let entry = db.lookup_fingerprint(&key).await.unwrap().unwrap();
        assert_eq!(entry.fingerprint, local);
        assert_eq!(entry.conflict_count, 1);
    }

    #[tokio::test]
    async fn gossip_fills_in_unknown_key() {
        let db = test_db().await;
        let key = fingerprint_key("song.mp3", 1000);
        let gossiped = Fingerprint::from_parts(Kind::Sha256Prefix, vec![9u8; 32]);
        db.merge_from_gossip(&key, &gossiped, 1000, 0, 7).await.unwrap();

        let entry = db.lookup_fingerprint(&key).await.unwrap().unwrap();
        assert_eq!(entry.fingerprint, gossiped);
        assert!(!entry.verified);
    }

    #[tokio::test]
    async fn gossiping_the_same_bytes_twice_into_an_unverified_row_does_not_bump_seq_id() {
        let db = test_db().await;
        let key = fingerprint_key("song.mp3", 1000);
        let gossiped = Fingerprint::from_parts(Kind::Sha256Prefix, vec![9u8; 32]);
        db.merge_from_gossip(&key, &gossiped, 1000, 0, 7).await.unwrap();
        let first = db.lookup_fingerprint(&key).await.unwrap().unwrap();

        db.merge_from_gossip(&key, &gossiped, 1000, 0, 9).await.unwrap();
        let second = db.lookup_fingerprint(&key).await.unwrap().unwrap();

        assert_eq!(first.seq_id, second.seq_id);
        assert_eq!(second.conflict_count, 0);
    }

    #[tokio::test]
    async fn entries_since_orders_by_seq_and_respects_watermark() {
        let db = test_db().await;
        let fp = Fingerprint::from_parts(Kind::Sha256Prefix, vec![1u8; 32]);
        for i in 0..3u64 {
            let key = fingerprint_key(&format!("song-{i}.mp3"), 1000);
            db.store_fingerprint(&key, &fp, 1000, 0).await.unwrap();
        }
        let since_zero = db.entries_since(0, 10).await.unwrap();
        assert_eq!(since_zero.len(), 3);
        let since_one = db.entries_since(1, 10).await.unwrap();
        assert_eq!(since_one.len(), 2);
    }

    #[tokio::test]
    async fn mesh_peer_state_tracks_watermark() {
        let db = test_db().await;
        assert_eq!(db.peer_last_seq_seen("peer-a").await.unwrap(), 0);
        db.set_peer_last_seq_seen("peer-a", 5).await.unwrap();
        assert_eq!(db.peer_last_seq_seen("peer-a").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn prune_unseen_removes_stale_peers_and_their_inventory() {
        let db = test_db().await;
        db.upsert_peer("peer-a", None, None).await.unwrap();
        db.upsert_inventory("peer-a", "/x", 1).await.unwrap();

        sqlx::query("UPDATE peers SET last_seen = ?1 WHERE peer_id = 'peer-a'")
            .bind((chrono::Utc::now() - chrono::Duration::days(30)).to_rfc3339())
            .execute(&db.pool)
            .await
            .unwrap();

        let removed = db.prune_unseen(chrono::Duration::days(7)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(db.get_peer("peer-a").await.is_err());
    }

    #[tokio::test]
    async fn backfill_counter_resets_on_new_day() {
        let db = test_db().await;
        db.upsert_peer("peer-a", None, None).await.unwrap();
        let c1 = db.increment_backfill_count("peer-a").await.unwrap();
        let c2 = db.increment_backfill_count("peer-a").await.unwrap();
        assert_eq!(c1, 1);
        assert_eq!(c2, 2);

        sqlx::query("UPDATE peers SET backfill_reset_day = '2000-01-01' WHERE peer_id = 'peer-a'")
            .execute(&db.pool)
            .await
            .unwrap();
        let c3 = db.increment_backfill_count("peer-a").await.unwrap();
        assert_eq!(c3, 1);
    }

    #[tokio::test]
    async fn backfill_candidates_excludes_capped_and_mesh_peers() {
        let db = test_db().await;
        db.upsert_peer("under-cap", None, None).await.unwrap();
        db.upsert_peer(
            "has-mesh",
            Some(Capabilities::HAS_FINGERPRINT_DB),
            None,
        )
        .await
        .unwrap();
        db.upsert_peer("at-cap", None, None).await.unwrap();
        for _ in 0..10 {
            db.increment_backfill_count("at-cap").await.unwrap();
        }

        db.upsert_inventory("under-cap", "/a.flac", 10).await.unwrap();
        db.upsert_inventory("has-mesh", "/b.flac", 10).await.unwrap();
        db.upsert_inventory("at-cap", "/c.flac", 10).await.unwrap();

        let candidates = db.backfill_candidates(10, 10).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].peer_id, "under-cap");
    }

    #[tokio::test]
    async fn mark_inventory_status_transitions_without_fingerprint() {
        let db = test_db().await;
        db.upsert_peer("peer-a", None, None).await.unwrap();
        let file_id = db.upsert_inventory("peer-a", "/x", 1).await.unwrap();
        db.mark_inventory_status(&file_id, InventoryStatus::Pending)
            .await
            .unwrap();
        let entry = db.get_inventory(&file_id).await.unwrap();
        assert_eq!(entry.status, InventoryStatus::Pending);
        assert!(entry.invariant_holds());
    }
}
