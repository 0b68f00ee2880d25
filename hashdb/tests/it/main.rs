//! Integration tests against the public `hashdb` API: a real file-backed
//! SQLite database (not the in-memory handle the per-module unit tests use)
//! and the cross-table flows the backfill scheduler and mesh sync rely on.

use hashdb::types::{Capabilities, EntrySource, InventoryStatus};
use hashdb::HashDb;

#[tokio::test]
async fn a_file_backed_db_survives_being_reopened() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hashdb.sqlite");

    {
        let db = HashDb::open(&path).await.unwrap();
        db.upsert_peer("peer-a", Some(Capabilities::SUPPORTS_MESH), Some("v1")).await.unwrap();
        let fp = fingerprint::Fingerprint::from_parts(fingerprint::Kind::Sha256Prefix, vec![7u8; 32]);
        db.store_fingerprint(&hashdb::fingerprint_key("song.mp3", 4096), &fp, 4096, 0).await.unwrap();
    }

    // Pool from the first handle is dropped; a fresh one against the same
    // file must see the migrated schema and the rows written through it.
    let reopened = HashDb::open(&path).await.unwrap();
    let peer = reopened.get_peer("peer-a").await.unwrap();
    assert!(peer.capabilities.contains(Capabilities::SUPPORTS_MESH));

    let entry = reopened
        .lookup_fingerprint(&hashdb::fingerprint_key("song.mp3", 4096))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.size, 4096);
}

/// Drives a peer through the full backfill eligibility lifecycle: a fresh
/// inventory row is a candidate, probing it to completion removes it from
/// the candidate pool, and the peer's daily counter advances.
#[tokio::test]
async fn backfill_candidate_lifecycle_across_peers_and_inventory() {
    let db = HashDb::open_in_memory().await.unwrap();
    db.upsert_peer("peer-a", None, None).await.unwrap();
    let file_id = db.upsert_inventory("peer-a", "/music/one.flac", 8192).await.unwrap();

    let candidates = db.backfill_candidates(10, 10).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].file_id, file_id);

    db.mark_inventory_status(&file_id, InventoryStatus::Pending).await.unwrap();
    assert!(db.backfill_candidates(10, 10).await.unwrap().is_empty());

    let fp = fingerprint::Fingerprint::from_parts(fingerprint::Kind::FlacStreamInfoMd5, vec![1u8; 16]);
    db.set_inventory_fingerprint(
        &file_id,
        InventoryStatus::Known,
        Some(&fp),
        Some(EntrySource::BackfillProbe),
        Default::default(),
    )
    .await
    .unwrap();
    db.increment_backfill_count("peer-a").await.unwrap();

    let entry = db.get_inventory(&file_id).await.unwrap();
    assert!(entry.invariant_holds());
    let peer = db.get_peer("peer-a").await.unwrap();
    assert_eq!(peer.backfill_today, 1);

    // A peer advertising HAS_FINGERPRINT_DB is never offered as a backfill
    // candidate, even with an unhashed row on record.
    db.upsert_peer("peer-b", Some(Capabilities::HAS_FINGERPRINT_DB), None).await.unwrap();
    db.upsert_inventory("peer-b", "/music/two.flac", 2048).await.unwrap();
    assert!(db.backfill_candidates(10, 10).await.unwrap().is_empty());
}
