//! One backfill scheduling cycle (spec section 4.6).

use std::sync::Arc;
use std::time::Duration;

use fingerprint::CodecMeta;
use hashdb::types::{Capabilities, CodecHints, EntrySource, InventoryEntry, InventoryStatus};
use hashdb::HashDb;
use tracing::{debug, warn};
use verification::{PeerId, TransferClient};

use crate::config::BackfillConfig;
use crate::error::Result;
use crate::stats::BackfillStats;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Selects up to `candidates_per_cycle` eligible inventory rows and drives a
/// single-peer verification probe against each, recording the outcome.
/// Isolated per candidate: one candidate's probe failure never aborts the
/// others. Concurrency across candidates is bounded by `max_concurrent`.
pub async fn run_cycle(
    hash_db: &HashDb,
    client: &Arc<dyn TransferClient>,
    config: &BackfillConfig,
    stats: &BackfillStats,
    cancel: &Arc<cancel::Token>,
) -> Result<()> {
    let candidates = hash_db
        .backfill_candidates(config.candidates_per_cycle, config.max_per_peer_per_day)
        .await?;

    stats.record_cycle_run();

    let semaphore = Arc::new(tokio::sync::Semaphore::new(config.max_concurrent as usize));
    let mut join_set = tokio::task::JoinSet::new();

    for candidate in candidates {
        if cancel.check_cancel().is_err() {
            break;
        }
        hash_db.mark_inventory_status(&candidate.file_id, InventoryStatus::Pending).await?;

        let hash_db = hash_db.clone();
        let client = Arc::clone(client);
        let semaphore = Arc::clone(&semaphore);
        let cancel = Arc::clone(cancel);
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            probe_one(&hash_db, client, candidate, cancel).await
        });
    }

    while let Some(joined) = join_set.join_next().await {
        let outcome = joined.expect("backfill probe task must not panic");
        apply_outcome(hash_db, stats, outcome).await?;
    }

    Ok(())
}

struct ProbeOutcome {
    file_id: String,
    peer_id: String,
    path: String,
    size: u64,
    fingerprint: Option<fingerprint::Fingerprint>,
    codec_meta: Option<CodecMeta>,
}

async fn probe_one(
    hash_db: &HashDb,
    client: Arc<dyn TransferClient>,
    candidate: InventoryEntry,
    cancel: Arc<cancel::Token>,
) -> ProbeOutcome {
    let peer = PeerId::from(candidate.peer_id.as_str());
    let report = verification::verify(
        client,
        hash_db,
        &candidate.path,
        candidate.size,
        vec![peer.clone()],
        PROBE_TIMEOUT,
        cancel,
    )
    .await;

    let group = report
        .best_group()
        .filter(|group| group.sources.iter().any(|(p, _)| *p == peer));
    let fingerprint = group.map(|g| g.fingerprint.clone());
    let codec_meta = group.and_then(|g| g.codec_meta);

    ProbeOutcome {
        file_id: candidate.file_id,
        peer_id: candidate.peer_id,
        path: candidate.path,
        size: candidate.size,
        fingerprint,
        codec_meta,
    }
}

async fn apply_outcome(hash_db: &HashDb, stats: &BackfillStats, outcome: ProbeOutcome) -> Result<()> {
    stats.record_probe_attempted();
    match outcome.fingerprint {
        Some(fingerprint) => {
            let codec_hints =
                outcome.codec_meta.map(CodecHints::from).unwrap_or_default();
            let meta_flags = outcome.codec_meta.map(|meta| meta.pack()).unwrap_or(0);
            hash_db
                .set_inventory_fingerprint(
                    &outcome.file_id,
                    InventoryStatus::Known,
                    Some(&fingerprint),
                    Some(EntrySource::BackfillProbe),
                    codec_hints,
                )
                .await?;
            let key = hashdb::fingerprint_key(&outcome.path, outcome.size);
            hash_db
                .store_fingerprint(&key, &fingerprint, outcome.size, meta_flags)
                .await?;
            hash_db.increment_backfill_count(&outcome.peer_id).await?;
            hash_db
                .merge_capabilities(&outcome.peer_id, Capabilities::SUPPORTS_BACKFILL_PROBE)
                .await?;
            stats.record_probe_succeeded();
            debug!(peer = %outcome.peer_id, path = %outcome.path, "backfill probe succeeded");
        }
        None => {
            hash_db.mark_inventory_status(&outcome.file_id, InventoryStatus::Failed).await?;
            stats.record_probe_failed();
            warn!(peer = %outcome.peer_id, path = %outcome.path, "backfill probe failed");
        }
    }
    Ok(())
}
