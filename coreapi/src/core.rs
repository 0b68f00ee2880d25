//! `Core`: the long-lived object background services are owned by (spec
//! section 9, "Design Notes" — "model these as long-lived tasks owned by a
//! Core object, started when Core starts and joined on shutdown").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backfill::{ActivityTracker, BackfillStats};
use hashdb::types::{Capabilities, JobSummary};
use hashdb::HashDb;
use mesh::{MeshScheduler, NeighborId, PeerViolations};
use swarm::{MultiSourceDownloadRequest, SwarmJob};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use verification::{PeerId, TransferClient};

use crate::config::Config;
use crate::connector::MeshConnector;
use crate::error::{Error, Result};
use crate::mesh_stats::MeshStats;

/// How often the mesh-sync task wakes up to ask the scheduler which
/// neighbors are due. Independent of any one neighbor's own
/// `mesh.sync_interval_seconds` cooldown.
const MESH_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// How long a peer can go unseen before [`hashdb::HashDb::prune_unseen`]
/// drops its record (spec section 3: "entries may be pruned if unseen
/// beyond a retention horizon").
const PEER_RETENTION_HORIZON: chrono::Duration = chrono::Duration::days(30);

/// How often the maintenance tick runs [`hashdb::HashDb::prune_unseen`].
const MAINTENANCE_TICK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Either a job still in flight, reported via its live [`swarm::Snapshot`],
/// or a job that has already reached a terminal state and been persisted.
#[derive(Debug)]
pub enum JobStatus {
    InProgress(swarm::Snapshot),
    Finished(JobSummary),
}

struct Background {
    cancel: Arc<cancel::Token>,
    handles: Vec<JoinHandle<()>>,
}

/// Wires together swarm downloads, mesh gossip, and backfill probing atop
/// one [`HashDb`] and one host-supplied [`TransferClient`]/[`MeshConnector`]
/// pair. No ambient global state: every background task is a handle owned
/// here, started by [`Core::start`] and joined by [`Core::shutdown`].
pub struct Core {
    hash_db: HashDb,
    config: Config,
    client: Arc<dyn TransferClient>,
    connector: Arc<dyn MeshConnector>,
    scratch_root: PathBuf,
    jobs: Arc<AsyncMutex<HashMap<String, Arc<swarm::Progress>>>>,
    mesh_scheduler: Arc<MeshScheduler>,
    mesh_violations: Arc<PeerViolations>,
    mesh_stats: Arc<MeshStats>,
    backfill_stats: Arc<BackfillStats>,
    activity: Arc<ActivityTracker>,
    background: Mutex<Option<Background>>,
}

impl Core {
    /// Builds a `Core` without starting its background tasks; call
    /// [`Self::start`] once construction-time wiring (tests, mock clients)
    /// is done.
    pub fn new(
        hash_db: HashDb,
        config: Config,
        client: Arc<dyn TransferClient>,
        connector: Arc<dyn MeshConnector>,
        scratch_root: PathBuf,
    ) -> Self {
        Self {
            hash_db,
            mesh_scheduler: Arc::new(MeshScheduler::new(config.mesh.to_mesh_config())),
            config,
            client,
            connector,
            scratch_root,
            jobs: Arc::new(AsyncMutex::new(HashMap::new())),
            mesh_violations: Arc::new(PeerViolations::new()),
            mesh_stats: Arc::new(MeshStats::new()),
            backfill_stats: Arc::new(BackfillStats::new()),
            activity: Arc::new(ActivityTracker::new()),
            background: Mutex::new(None),
        }
    }

    /// Spawns the mesh-sync, backfill, and maintenance loops. Idempotent
    /// only in the sense that a second call spawns a second, independent
    /// set of tasks sharing the same state — callers should call this once.
    pub fn start(&self) {
        let cancel = Arc::new(cancel::Token::new());
        let mut handles = Vec::new();

        handles.push(tokio::spawn({
            let hash_db = self.hash_db.clone();
            let client = Arc::clone(&self.client);
            let config = self.config.backfill.to_backfill_config();
            let stats = Arc::clone(&self.backfill_stats);
            let activity = Arc::clone(&self.activity);
            let cancel = Arc::clone(&cancel);
            async move {
                if let Err(e) = backfill::run_loop(hash_db, client, config, stats, activity, cancel).await {
                    warn!(error = %e, "backfill loop exited with an error");
                }
            }
        }));

        handles.push(tokio::spawn(mesh_loop(
            self.hash_db.clone(),
            Arc::clone(&self.connector),
            self.config.mesh.to_mesh_config(),
            Arc::clone(&self.mesh_scheduler),
            Arc::clone(&self.mesh_violations),
            Arc::clone(&self.mesh_stats),
            Arc::clone(&cancel),
        )));

        handles.push(tokio::spawn(maintenance_loop(self.hash_db.clone(), Arc::clone(&cancel))));

        *self.background.lock().expect("background mutex poisoned") = Some(Background { cancel, handles });
    }

    /// Signals every background task to stop and waits for them to exit.
    pub async fn shutdown(&self) {
        let background = self.background.lock().expect("background mutex poisoned").take();
        if let Some(background) = background {
            background.cancel.cancel();
            for handle in background.handles {
                let _ = handle.await;
            }
        }
    }

    /// Probes `candidates` and groups them by matching content (spec section
    /// 4.2). Peer discovery/search is a host concern, so candidates are
    /// supplied by the caller rather than looked up internally.
    pub async fn find_verified_sources(
        &self,
        filename: &str,
        size: u64,
        candidates: Vec<PeerId>,
    ) -> verification::Report {
        verification::verify(
            Arc::clone(&self.client),
            &self.hash_db,
            filename,
            size,
            candidates,
            self.config.verification.probe_timeout(),
            Arc::new(cancel::Token::new()),
        )
        .await
    }

    /// Starts a chunked multi-source download as a background job and
    /// returns its id immediately; poll [`Self::job_status`] for progress.
    pub async fn start_swarm(&self, request: MultiSourceDownloadRequest) -> String {
        self.activity.mark_active();
        let job = SwarmJob::new(
            request,
            self.config.swarm.to_swarm_config(),
            self.scratch_root.clone(),
            Arc::new(cancel::Token::new()),
        );
        let id = job.id().to_string();
        let progress = job.progress();
        self.jobs.lock().await.insert(id.clone(), progress);

        let client = Arc::clone(&self.client);
        let hash_db = self.hash_db.clone();
        let jobs = Arc::clone(&self.jobs);
        let id_for_cleanup = id.clone();
        tokio::spawn(async move {
            let outcome = job.run(client, &hash_db).await;
            match &outcome {
                Ok(o) => info!(job_id = %id_for_cleanup, state = %o.summary.state, "swarm job finished"),
                Err(e) => warn!(job_id = %id_for_cleanup, error = %e, "swarm job failed"),
            }
            jobs.lock().await.remove(&id_for_cleanup);
        });

        id
    }

    /// Reports progress for an in-flight job, or the persisted terminal
    /// summary for one that has already finished.
    pub async fn job_status(&self, id: &str) -> Result<JobStatus> {
        if let Some(progress) = self.jobs.lock().await.get(id) {
            return Ok(JobStatus::InProgress(progress.snapshot()));
        }
        self.hash_db
            .get_job_summary(id)
            .await
            .map(JobStatus::Finished)
            .map_err(|_| Error::UnknownJob(id.to_string()))
    }

    /// Looks up a previously published fingerprint by its normalized key
    /// (spec section 4.4).
    pub async fn lookup_fingerprint(&self, key: &str) -> Result<Option<hashdb::types::FingerprintEntry>> {
        Ok(self.hash_db.lookup_fingerprint(key).await?)
    }

    pub fn mesh_stats(&self) -> crate::mesh_stats::Snapshot {
        self.mesh_stats.snapshot()
    }

    pub fn backfill_stats(&self) -> backfill::Snapshot {
        self.backfill_stats.snapshot()
    }

    /// Runs one mesh-sync session against `peer` outside the scheduler's
    /// normal cadence, bypassing `select_cycle`'s cooldown filter. Useful
    /// for a host that just learned a neighbor has fresh data.
    pub async fn trigger_mesh_sync(&self, peer: &NeighborId) -> Result<mesh::SessionReport> {
        let transport = self
            .connector
            .connect(peer)
            .await
            .map_err(|e| Error::UnknownNeighbor(e.to_string()))?;
        let report = sync_one(
            transport,
            peer,
            &self.hash_db,
            &self.config.mesh.to_mesh_config(),
            &self.mesh_violations,
        )
        .await;
        match &report {
            Ok(r) => self.mesh_stats.record_initiated(r),
            Err(_) => self.mesh_stats.record_failed(),
        }
        self.mesh_scheduler.record_synced(peer, std::time::Instant::now());
        Ok(report?)
    }

    /// Runs one backfill cycle immediately, bypassing the idle gate and the
    /// loop's timer. Exists mainly so tests don't have to wait out a full
    /// `backfill.interval_seconds`.
    pub async fn trigger_backfill_cycle(&self) -> Result<()> {
        backfill::run_cycle(
            &self.hash_db,
            &self.client,
            &self.config.backfill.to_backfill_config(),
            &self.backfill_stats,
            &Arc::new(cancel::Token::new()),
        )
        .await?;
        Ok(())
    }
}

async fn sync_one(
    mut transport: Box<dyn mesh::MeshTransport>,
    peer: &NeighborId,
    hash_db: &HashDb,
    config: &mesh::MeshConfig,
    violations: &PeerViolations,
) -> mesh::Result<mesh::SessionReport> {
    let cancel = cancel::Token::new();
    mesh::run_initiator(transport.as_mut(), peer, hash_db, config, violations, &cancel).await
}

/// Sleeps for `total`, polling `cancel` at a short, fixed granularity so a
/// long-period background loop still reacts to shutdown quickly. Returns
/// `false` if cancellation was observed instead of completing the sleep.
async fn cooperative_sleep(total: Duration, cancel: &cancel::Token) -> bool {
    const POLL_QUANTUM: Duration = Duration::from_millis(200);
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if cancel.check_cancel().is_err() {
            return false;
        }
        let step = remaining.min(POLL_QUANTUM);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
    cancel.check_cancel().is_ok()
}

async fn mesh_loop(
    hash_db: HashDb,
    connector: Arc<dyn MeshConnector>,
    config: mesh::MeshConfig,
    scheduler: Arc<MeshScheduler>,
    violations: Arc<PeerViolations>,
    stats: Arc<MeshStats>,
    cancel: Arc<cancel::Token>,
) {
    loop {
        if !cooperative_sleep(MESH_TICK_INTERVAL, &cancel).await {
            return;
        }

        let neighbors = match hash_db.list_peers().await {
            Ok(peers) => mesh_capable_neighbors(peers),
            Err(e) => {
                warn!(error = %e, "failed to list mesh-capable peers");
                continue;
            }
        };

        let due = scheduler.select_cycle(&neighbors, std::time::Instant::now());
        for peer in due {
            if violations.is_over_threshold(&peer) {
                continue;
            }
            let transport = match connector.connect(&peer).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "mesh connector could not reach neighbor");
                    stats.record_failed();
                    continue;
                }
            };
            match sync_one(transport, &peer, &hash_db, &config, &violations).await {
                Ok(report) => stats.record_initiated(&report),
                Err(e) => {
                    warn!(peer = %peer, error = %e, "mesh sync session failed");
                    stats.record_failed();
                }
            }
            scheduler.record_synced(&peer, std::time::Instant::now());
        }
    }
}

/// Derives the mesh-sync neighbor set from HashDB's peer table rather than
/// a separate neighbor-registration API: any peer observed to support mesh
/// (SPEC_FULL.md C.1) is fair game for the next scheduling cycle.
fn mesh_capable_neighbors(peers: Vec<hashdb::types::Peer>) -> Vec<NeighborId> {
    peers
        .into_iter()
        .filter(|peer| peer.capabilities.contains(Capabilities::SUPPORTS_MESH))
        .map(|peer| NeighborId::from(peer.peer_id.as_str()))
        .collect()
}

async fn maintenance_loop(hash_db: HashDb, cancel: Arc<cancel::Token>) {
    loop {
        if !cooperative_sleep(MAINTENANCE_TICK_INTERVAL, &cancel).await {
            return;
        }
        match hash_db.prune_unseen(PEER_RETENTION_HORIZON).await {
            Ok(pruned) if pruned > 0 => info!(pruned, "pruned stale peer records"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to prune stale peer records"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use hashdb::types::Peer;

    fn peer(id: &str, capabilities: Capabilities) -> Peer {
        Peer {
            peer_id: id.to_string(),
            capabilities,
            client_version: None,
            last_seen: Utc::now(),
            last_capability_check: None,
            backfill_today: 0,
            backfill_reset_day: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        }
    }

    #[test]
    fn only_mesh_capable_peers_become_sync_candidates() {
        let peers = vec![
            peer("mesh-peer", Capabilities::SUPPORTS_MESH),
            peer("backfill-only-peer", Capabilities::SUPPORTS_BACKFILL_PROBE),
            peer("full-capability-peer", Capabilities::SUPPORTS_MESH | Capabilities::HAS_FINGERPRINT_DB),
        ];

        let neighbors = mesh_capable_neighbors(peers);

        assert_eq!(neighbors, vec![NeighborId::from("mesh-peer"), NeighborId::from("full-capability-peer")]);
    }

    #[tokio::test]
    async fn cooperative_sleep_returns_false_promptly_once_cancelled() {
        let cancel = cancel::Token::new();
        cancel.cancel();
        let completed = cooperative_sleep(Duration::from_secs(3600), &cancel).await;
        assert!(!completed);
    }
}
