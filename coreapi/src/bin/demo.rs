//! A minimal client binary that wires up `Core` against a devnull transport,
//! the way `vsi`'s dry-run mode exercises its own pipeline without a real
//! network (spec section 4.7).

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use coreapi::{config::Config, ConnectError, Core, JobStatus, MeshConnector};
use hashdb::HashDb;
use mesh::{MeshTransport, NeighborId};
use stable_eyre::Result;
use swarm::MultiSourceDownloadRequest;
use tokio::io::AsyncWrite;
use tracing::info;
use verification::{DownloadOptions, PeerAttributes, PeerId, TransferClient, TransferError};

/// Runs one swarm download against whatever peers are given, logging
/// progress until the job reaches a terminal state.
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cmd {
    #[clap(flatten)]
    config: Config,

    /// Remote filename to request.
    #[clap(long, default_value = "demo.flac")]
    filename: String,

    /// Declared file size in bytes.
    #[clap(long, default_value_t = 1024 * 1024)]
    size: u64,

    /// Candidate peer ids to verify and download from.
    #[clap(long, num_args = 1.., default_values_t = ["peer-a".to_string(), "peer-b".to_string()])]
    peers: Vec<String>,

    /// Where to write the assembled file.
    #[clap(long, default_value = "demo-output.bin")]
    output: PathBuf,
}

/// A transport that never actually reaches a peer, standing in for a real
/// network client the way `vsi::api::Devnull` stands in for Fossa's API.
struct Devnull;

#[async_trait]
impl TransferClient for Devnull {
    async fn download(
        &self,
        peer: &PeerId,
        _remote_path: &str,
        _sink: &mut (dyn AsyncWrite + Unpin + Send),
        _size: u64,
        _start_offset: u64,
        _options: DownloadOptions,
        _cancel: &cancel::Token,
    ) -> std::result::Result<u64, TransferError> {
        Err(TransferError::Transport(format!("devnull: no route to {peer}")))
    }

    async fn peer_attributes(&self, _peer: &PeerId) -> std::result::Result<PeerAttributes, TransferError> {
        Ok(PeerAttributes::default())
    }
}

struct NoConnector;

#[async_trait]
impl MeshConnector for NoConnector {
    async fn connect(&self, peer: &NeighborId) -> std::result::Result<Box<dyn MeshTransport>, ConnectError> {
        Err(ConnectError::Unreachable(peer.clone()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    stable_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cmd = Cmd::parse();
    let config = cmd.config.validate()?;

    let hash_db = HashDb::open_in_memory().await?;
    let scratch = std::env::temp_dir().join("coreapi-demo");
    let core = Core::new(hash_db, config, Arc::new(Devnull), Arc::new(NoConnector), scratch);
    core.start();

    let candidates: Vec<PeerId> = cmd.peers.iter().map(|p| PeerId::from(p.as_str())).collect();
    let report = core.find_verified_sources(&cmd.filename, cmd.size, candidates.clone()).await;
    info!(groups = report.groups.len(), failures = report.failures.len(), "verification probe finished");

    let request = MultiSourceDownloadRequest {
        filename: cmd.filename,
        size: cmd.size,
        expected_fingerprint: None,
        sources: candidates,
        chunk_size: 1024 * 1024,
        output_path: cmd.output,
    };
    let job_id = core.start_swarm(request).await;
    info!(job_id = %job_id, "swarm job started");

    loop {
        match core.job_status(&job_id).await? {
            JobStatus::Finished(summary) => {
                info!(state = %summary.state, error = ?summary.error_message, "swarm job finished");
                break;
            }
            JobStatus::InProgress(snapshot) => {
                info!(bytes = snapshot.bytes_downloaded, "swarm job in progress");
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }

    core.shutdown().await;
    Ok(())
}
