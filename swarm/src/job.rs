//! The `SwarmJob` state machine: plans chunks, dispatches workers, runs
//! proven-source retry rounds, assembles, and performs final verification
//! (spec section 4.3 / 4.4 "Lifecycles").

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use hashdb::HashDb;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use verification::{PeerId, TransferClient};

use crate::assemble::{assemble, verify_final};
use crate::config::SwarmConfig;
use crate::error::{Error, Result};
use crate::plan::{plan, Chunk};
use crate::progress::Progress;
use crate::queue::WorkQueue;
use crate::worker;

/// A request to fetch one file from a set of peers already agreed (by
/// `ContentVerification`) to hold the same content.
#[derive(Clone, Debug)]
pub struct MultiSourceDownloadRequest {
    pub filename: String,
    pub size: u64,
    pub expected_fingerprint: Option<fingerprint::Fingerprint>,
    pub sources: Vec<PeerId>,
    pub chunk_size: u64,
    pub output_path: PathBuf,
}

/// The lifecycle state of a [`SwarmJob`] (spec section 4.3).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum JobState {
    Verifying,
    Downloading,
    Assembling,
    VerifyingFinal,
    Completed,
    Failed,
}

impl JobState {
    fn as_str(self) -> &'static str {
        match self {
            JobState::Verifying => "verifying",
            JobState::Downloading => "downloading",
            JobState::Assembling => "assembling",
            JobState::VerifyingFinal => "verifying-final",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

/// The result of a completed [`SwarmJob::run`]: the persisted summary plus
/// the assembled file's full-file SHA-256, which is always computed but only
/// compared against `expected_fingerprint` when that fingerprint is of kind
/// [`fingerprint::Kind::Sha256Prefix`].
pub struct JobOutcome {
    pub summary: hashdb::types::JobSummary,
    pub full_sha256: [u8; 32],
}

/// A multi-source chunked download in progress. Construct with [`SwarmJob::new`],
/// poll [`SwarmJob::progress`] from another task while [`SwarmJob::run`] drives
/// it to completion.
pub struct SwarmJob {
    id: String,
    request: MultiSourceDownloadRequest,
    config: SwarmConfig,
    scratch_root: PathBuf,
    progress: Arc<Progress>,
    cancel: Arc<cancel::Token>,
}

impl SwarmJob {
    pub fn new(
        request: MultiSourceDownloadRequest,
        config: SwarmConfig,
        scratch_root: PathBuf,
        cancel: Arc<cancel::Token>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request,
            config,
            scratch_root,
            progress: Arc::new(Progress::default()),
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// A handle other tasks can poll for progress while [`Self::run`] is
    /// in flight.
    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    /// Drives the job through its full lifecycle, persisting a terminal
    /// [`hashdb::types::JobSummary`] to `hash_db` regardless of outcome, and
    /// publishing the resulting fingerprint on success.
    pub async fn run(self, client: Arc<dyn TransferClient>, hash_db: &HashDb) -> Result<JobOutcome> {
        let scratch_dir = self.scratch_root.join(&self.id);
        let outcome = self.run_inner(Arc::clone(&client), &scratch_dir, hash_db).await;
        let _ = tokio::fs::remove_dir_all(&scratch_dir).await;

        let snapshot = self.progress.snapshot();
        let total_chunks = match &outcome {
            Ok((chunks, _)) => chunks.len() as u32,
            Err(_) => snapshot.completed_chunks,
        };

        let (state, error_kind, error_message) = match &outcome {
            Ok(_) => (JobState::Completed, None, None),
            Err(e) => (JobState::Failed, Some(error_kind_str(e).to_string()), Some(e.to_string())),
        };

        if let Ok((_, _)) = &outcome {
            if let Some(expected) = &self.request.expected_fingerprint {
                let key = hashdb::fingerprint_key(&self.request.filename, self.request.size);
                if let Err(e) = hash_db.store_fingerprint(&key, expected, self.request.size, 0).await {
                    warn!(job_id = %self.id, error = %e, "failed to publish fingerprint after successful download");
                }
            }
        }

        let summary = hashdb::types::JobSummary {
            id: self.id.clone(),
            filename: self.request.filename.clone(),
            size: self.request.size,
            state: state.as_str().to_string(),
            bytes_downloaded: snapshot.bytes_downloaded,
            completed_chunks: snapshot.completed_chunks,
            total_chunks,
            error_kind,
            error_message,
            finished_at: Utc::now(),
        };
        hash_db.record_job_summary(&summary).await?;

        info!(job_id = %self.id, state = state.as_str(), "swarm job finished");
        outcome.map(|(_, final_hash)| JobOutcome {
            summary,
            full_sha256: final_hash.full_sha256,
        })
    }

    async fn run_inner(
        &self,
        client: Arc<dyn TransferClient>,
        scratch_dir: &PathBuf,
        hash_db: &HashDb,
    ) -> Result<(Vec<Chunk>, crate::assemble::FinalHash)> {
        if self.request.sources.len() < 2 {
            return Err(Error::NoVerifiedSources);
        }

        let chunks = plan(self.request.size, self.request.chunk_size, self.request.sources.len());
        tokio::fs::create_dir_all(scratch_dir).await?;

        let queue = Arc::new(WorkQueue::new(chunks.clone()));
        let filename: Arc<str> = Arc::from(self.request.filename.as_str());
        let scratch_dir_arc = Arc::new(scratch_dir.clone());

        let mut proven = self
            .dispatch(
                &client,
                &filename,
                &queue,
                &scratch_dir_arc,
                &self.request.sources,
                hash_db,
                None,
            )
            .await;

        if self.cancel.check_cancel().is_err() {
            return Err(Error::Cancelled);
        }

        for _round in 0..self.config.max_retry_rounds {
            if queue.is_empty().await {
                break;
            }
            if proven.is_empty() {
                break;
            }
            if self.cancel.check_cancel().is_err() {
                return Err(Error::Cancelled);
            }
            let semaphore = Arc::new(Semaphore::new(self.config.retry_semaphore));
            let round_proven = self
                .dispatch(&client, &filename, &queue, &scratch_dir_arc, &proven, hash_db, Some(semaphore))
                .await;
            for peer in round_proven {
                if !proven.contains(&peer) {
                    proven.push(peer);
                }
            }
        }

        if !queue.is_empty().await {
            return Err(Error::ChunkExhaustion {
                remaining: queue.len().await,
            });
        }

        assemble(scratch_dir, &chunks, &self.request.output_path).await?;
        let final_hash = verify_final(
            &self.request.output_path,
            self.request.expected_fingerprint.as_ref(),
        )
        .await?;

        Ok((chunks, final_hash))
    }

    async fn dispatch(
        &self,
        client: &Arc<dyn TransferClient>,
        filename: &Arc<str>,
        queue: &Arc<WorkQueue>,
        scratch_dir: &Arc<PathBuf>,
        peers: &[PeerId],
        hash_db: &HashDb,
        semaphore: Option<Arc<Semaphore>>,
    ) -> Vec<PeerId> {
        let mut join_set = tokio::task::JoinSet::new();
        for peer in peers.iter().cloned() {
            let client = Arc::clone(client);
            let filename = Arc::clone(filename);
            let queue = Arc::clone(queue);
            let scratch_dir = Arc::clone(scratch_dir);
            let progress = Arc::clone(&self.progress);
            let config = self.config;
            let cancel = Arc::clone(&self.cancel);
            let size = self.request.size;
            let semaphore = semaphore.clone();
            let hash_db = hash_db.clone();
            join_set.spawn(async move {
                let _permit = match semaphore {
                    Some(sem) => Some(sem.acquire_owned().await.expect("semaphore never closed")),
                    None => None,
                };
                let proven = worker::run(client, peer.clone(), filename, size, queue, scratch_dir, progress, config, hash_db, cancel).await;
                (peer, proven)
            });
        }

        let mut proven = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (peer, ok) = joined.expect("worker task must not panic");
            if ok {
                proven.push(peer);
            }
        }
        proven
    }
}

fn error_kind_str(e: &Error) -> &'static str {
    match e {
        Error::NoVerifiedSources => "no_verified_sources",
        Error::FinalHashMismatch => "final_hash_mismatch",
        Error::ChunkExhaustion { .. } => "chunk_exhaustion",
        Error::Cancelled => "cancelled",
        Error::Io(_) => "io_error",
        Error::Store(_) => "store_error",
    }
}
