//! One logical worker per verified source: pulls chunks from the shared
//! queue, downloads them through a [`TransferClient`], and cycles itself off
//! a chunk (re-queuing it at the front) when throughput falls below
//! `min_worker_bps` for a full `slow_window` (spec section 4.3).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use defer_lite::defer;
use hashdb::HashDb;
use tokio::fs::File;

use verification::bounded_writer::BoundedWriter;
use verification::{DownloadOptions, PeerId, TransferClient};

use crate::config::SwarmConfig;
use crate::plan::{scratch_path, Chunk};
use crate::progress::Progress;
use crate::queue::WorkQueue;
use crate::throughput_writer::ThroughputWriter;

enum Outcome {
    Completed,
    Slow,
}

async fn download_chunk(
    client: &dyn TransferClient,
    peer: &PeerId,
    filename: &str,
    size: u64,
    chunk: Chunk,
    scratch_dir: &Path,
    config: &SwarmConfig,
    hash_db: &HashDb,
    job_cancel: &cancel::Token,
) -> Result<(Outcome, u64), verification::TransferError> {
    let path = scratch_path(scratch_dir, &chunk);
    let file = File::create(&path)
        .await
        .map_err(|e| verification::TransferError::Transport(e.to_string()))?;

    let written_counter = Arc::new(AtomicU64::new(0));
    let mut sink = BoundedWriter::new(ThroughputWriter::new(file, Arc::clone(&written_counter)), chunk.len());

    let chunk_cancel = cancel::Token::new();
    let min_bps = config.min_worker_bps as f64;
    let window = config.slow_window;

    let monitor = async {
        let mut last = 0u64;
        loop {
            tokio::time::sleep(window).await;
            if job_cancel.check_cancel().is_err() {
                return;
            }
            let now = written_counter.load(Ordering::Relaxed);
            let delta = now.saturating_sub(last);
            last = now;
            let bps = delta as f64 / window.as_secs_f64().max(0.001);
            if bps < min_bps {
                return;
            }
        }
    };

    let download = client.download(
        peer,
        filename,
        &mut sink,
        size,
        chunk.start,
        DownloadOptions::default(),
        &chunk_cancel,
    );
    tokio::pin!(download);

    tokio::select! {
        result = &mut download => {
            if let Err(e) = verification::observe_download(hash_db, peer, chunk.start, &result).await {
                tracing::warn!(peer = %peer, error = %e, "failed to record capability observation");
            }
            result?;
            Ok((Outcome::Completed, sink.written()))
        }
        _ = monitor => {
            chunk_cancel.cancel();
            let _ = download.await;
            Ok((Outcome::Slow, 0))
        }
    }
}

/// Runs the worker loop for `peer` until the queue drains, the job is
/// cancelled, or this peer exceeds `max_consecutive_failures`. Returns
/// whether this peer ever completed at least one chunk (used by the job to
/// decide whether the peer contributed at all).
pub async fn run(
    client: Arc<dyn TransferClient>,
    peer: PeerId,
    filename: Arc<str>,
    size: u64,
    queue: Arc<WorkQueue>,
    scratch_dir: Arc<PathBuf>,
    progress: Arc<Progress>,
    config: SwarmConfig,
    hash_db: HashDb,
    cancel: Arc<cancel::Token>,
) -> bool {
    progress.worker_started();
    defer! {
        progress.worker_stopped();
    }

    let mut consecutive_failures = 0u32;
    let mut proven = false;

    while let Some(chunk) = queue.pop().await {
        if cancel.check_cancel().is_err() {
            queue.push_back(chunk).await;
            break;
        }

        progress.chunk_started();
        let result = download_chunk(
            client.as_ref(),
            &peer,
            &filename,
            size,
            chunk,
            &scratch_dir,
            &config,
            &hash_db,
            &cancel,
        )
        .await;

        match result {
            Ok((Outcome::Completed, n)) => {
                progress.add_bytes(n);
                progress.chunk_finished();
                consecutive_failures = 0;
                proven = true;
            }
            Ok((Outcome::Slow, _)) => {
                progress.chunk_abandoned();
                queue.push_front(chunk).await;
                tokio::time::sleep(config.slow_cooldown).await;
            }
            Err(_) => {
                progress.chunk_abandoned();
                queue.push_back(chunk).await;
                consecutive_failures += 1;
                if consecutive_failures >= config.max_consecutive_failures {
                    break;
                }
            }
        }
    }

    proven
}
