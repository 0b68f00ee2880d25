//! Integration tests against the public `swarm` API: a full job lifecycle
//! driven end to end through [`SwarmJob::run`], observed only via the types
//! the crate actually exports (no access to its internal worker/queue/plan
//! modules).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use swarm::{Error, MultiSourceDownloadRequest, SwarmConfig, SwarmJob};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use verification::{DownloadOptions, PeerAttributes, PeerId, TransferClient, TransferError};

struct FakePeer {
    data: Vec<u8>,
}

struct FakeClient {
    peers: HashMap<String, FakePeer>,
    calls: AtomicU32,
}

#[async_trait]
impl TransferClient for FakeClient {
    async fn download(
        &self,
        peer: &PeerId,
        _remote_path: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        _size: u64,
        start_offset: u64,
        _options: DownloadOptions,
        _cancel: &cancel::Token,
    ) -> Result<u64, TransferError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let data = &self.peers.get(peer.as_str()).expect("unknown peer").data;
        let slice = &data[start_offset as usize..];
        sink.write_all(slice).await.map_err(|e| TransferError::Transport(e.to_string()))?;
        Ok(slice.len() as u64)
    }

    async fn peer_attributes(&self, _peer: &PeerId) -> Result<PeerAttributes, TransferError> {
        Ok(PeerAttributes::default())
    }
}

fn sample_file(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

fn scratch_paths(dir: &tempfile::TempDir) -> (PathBuf, PathBuf) {
    (dir.path().join("out.bin"), dir.path().join("scratch"))
}

#[tokio::test]
async fn a_completed_job_publishes_its_fingerprint_to_hashdb() {
    let data = sample_file(20_000);
    let mut peers = HashMap::new();
    peers.insert("p1".to_string(), FakePeer { data: data.clone() });
    peers.insert("p2".to_string(), FakePeer { data: data.clone() });
    let client: Arc<dyn TransferClient> = Arc::new(FakeClient { peers, calls: AtomicU32::new(0) });

    let dir = tempfile::tempdir().unwrap();
    let (output_path, scratch_root) = scratch_paths(&dir);
    let expected = fingerprint::fingerprint(&data[..fingerprint::NON_FLAC_PREFIX_BYTES.min(data.len())], std::path::Path::new("album.bin"))
        .map(|(kind, bytes, _)| fingerprint::Fingerprint::from_parts(kind, bytes))
        .unwrap();

    let request = MultiSourceDownloadRequest {
        filename: "album.bin".to_string(),
        size: data.len() as u64,
        expected_fingerprint: Some(expected.clone()),
        sources: vec![PeerId::from("p1"), PeerId::from("p2")],
        chunk_size: 4_000,
        output_path: output_path.clone(),
    };
    let job = SwarmJob::new(request, SwarmConfig::default(), scratch_root, Arc::new(cancel::Token::new()));
    let hash_db = hashdb::HashDb::open_in_memory().await.unwrap();
    let outcome = job.run(client, &hash_db).await.expect("job should succeed");
    assert_eq!(outcome.summary.state, "completed");

    let key = hashdb::fingerprint_key("album.bin", data.len() as u64);
    let stored = hash_db.lookup_fingerprint(&key).await.unwrap().expect("fingerprint published");
    assert_eq!(stored.fingerprint, expected);
    assert!(stored.verified);
}

#[tokio::test]
async fn a_job_summary_is_queryable_from_hashdb_after_a_failure() {
    let data = sample_file(500);
    let mut peers = HashMap::new();
    peers.insert("only".to_string(), FakePeer { data });
    let client: Arc<dyn TransferClient> = Arc::new(FakeClient { peers, calls: AtomicU32::new(0) });

    let dir = tempfile::tempdir().unwrap();
    let (output_path, scratch_root) = scratch_paths(&dir);
    let request = MultiSourceDownloadRequest {
        filename: "solo.bin".to_string(),
        size: 500,
        expected_fingerprint: None,
        sources: vec![PeerId::from("only")],
        chunk_size: 64,
        output_path,
    };
    let job = SwarmJob::new(request, SwarmConfig::default(), scratch_root, Arc::new(cancel::Token::new()));
    let hash_db = hashdb::HashDb::open_in_memory().await.unwrap();
    let job_id = job.id().to_string();

    let err = job.run(client, &hash_db).await.unwrap_err();
    assert!(matches!(err, Error::NoVerifiedSources));

    let summary = hash_db.get_job_summary(&job_id).await.unwrap();
    assert_eq!(summary.state, "failed");
}
