//! Bounded-prefix concurrent peer probing and fingerprint-based grouping
//! (spec section 4.2).
//!
//! [`verify::verify`] is the entry point: given a filename, its declared
//! size, and a set of candidate peers, it probes each concurrently via the
//! host-supplied [`client::TransferClient`] and groups peers by the
//! fingerprint their probe produced.

pub mod bounded_writer;
pub mod capability;
pub mod client;
pub mod error;
mod probe;
mod verify;

pub use capability::{infer_from_download, observe_download};
pub use client::{DownloadOptions, PeerAttributes, PeerId, SearchFile, TransferClient, TransferError};
pub use error::Error;
pub use probe::{probe_peer, ProbeSuccess};
pub use verify::{verify, Group, Report};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncWrite, AsyncWriteExt};

    struct FakePeer {
        flac_md5: [u8; 16],
        reject: bool,
        delay: Duration,
    }

    struct FakeClient {
        peers: std::collections::HashMap<String, FakePeer>,
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            let info = self
                .peers
                .get(peer.as_str())
                .expect("unknown peer in test fixture");
            if info.reject && start_offset > 0 {
                return Err(TransferError::RemoteRejected { start_offset });
            }
            if info.reject {
                return Err(TransferError::Transport("simulated failure".into()));
            }
            if !info.delay.is_zero() {
                tokio::time::sleep(info.delay).await;
            }
            let prefix = sample_flac_prefix(info.flac_md5);
            sink.write_all(&prefix).await.map_err(|e| TransferError::Transport(e.to_string()))?;
            Ok(prefix.len() as u64)
        }

        async fn peer_attributes(&self, _peer: &PeerId) -> Result<PeerAttributes, TransferError> {
            Ok(PeerAttributes::default())
        }
    }

    fn sample_flac_prefix(md5: [u8; 16]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"fLaC");
        buf.push(0b1000_0000);
        buf.extend_from_slice(&[0x00, 0x00, 0x22]);
        buf.extend_from_slice(&4096u16.to_be_bytes());
        buf.extend_from_slice(&4096u16.to_be_bytes());
        buf.extend_from_slice(&[0x00, 0x10, 0x00]);
        buf.extend_from_slice(&[0x00, 0x20, 0x00]);
        let mut packed = [0u8; 8];
        packed[0] = (44_100u32 >> 12) as u8;
        packed[1] = (44_100u32 >> 4) as u8;
        packed[2] = (((44_100u32 << 4) & 0xF0) as u8) | (1 << 1) | (15 >> 4);
        packed[3] = 15 << 4;
        buf.extend_from_slice(&packed);
        buf.extend_from_slice(&md5);
        buf
    }

    async fn test_hash_db() -> hashdb::HashDb {
        hashdb::HashDb::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn groups_matching_peers_and_isolates_one_mismatch() {
        let mut peers = std::collections::HashMap::new();
        peers.insert(
            "p1".to_string(),
            FakePeer {
                flac_md5: [0x11; 16],
                reject: false,
                delay: Duration::ZERO,
            },
        );
        peers.insert(
            "p2".to_string(),
            FakePeer {
                flac_md5: [0x11; 16],
                reject: false,
                delay: Duration::from_millis(5),
            },
        );
        peers.insert(
            "p3".to_string(),
            FakePeer {
                flac_md5: [0x22; 16],
                reject: false,
                delay: Duration::ZERO,
            },
        );
        let client: Arc<dyn TransferClient> = Arc::new(FakeClient {
            peers,
            calls: AtomicU32::new(0),
        });
        let hash_db = test_hash_db().await;
        let cancel = Arc::new(cancel::Token::new());

        let candidates = vec!["p1".into(), "p2".into(), "p3".into()];
        let report = verify(
            client,
            &hash_db,
            "song.flac",
            100_000,
            candidates,
            Duration::from_secs(1),
            cancel,
        )
        .await;

        assert!(report.failures.is_empty());
        let best = report.best_group().expect("a best group");
        assert_eq!(best.sources.len(), 2);
        assert_eq!(best.sources[0].0.as_str(), "p1");
    }

    #[tokio::test]
    async fn probe_failure_is_isolated_to_that_peer() {
        let mut peers = std::collections::HashMap::new();
        peers.insert(
            "good".to_string(),
            FakePeer {
                flac_md5: [0x11; 16],
                reject: false,
                delay: Duration::ZERO,
            },
        );
        peers.insert(
            "bad".to_string(),
            FakePeer {
                flac_md5: [0; 16],
                reject: true,
                delay: Duration::ZERO,
            },
        );
        let client: Arc<dyn TransferClient> = Arc::new(FakeClient {
            peers,
            calls: AtomicU32::new(0),
        });
        let hash_db = test_hash_db().await;
        let cancel = Arc::new(cancel::Token::new());

        let report = verify(
            client,
            &hash_db,
            "song.flac",
            100_000,
            vec!["good".into(), "bad".into()],
            Duration::from_secs(1),
            cancel,
        )
        .await;

        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0.as_str(), "bad");
    }

    #[tokio::test]
    async fn file_too_small_is_refused_without_probing() {
        let peers = std::collections::HashMap::new();
        let client: Arc<dyn TransferClient> = Arc::new(FakeClient {
            peers,
            calls: AtomicU32::new(0),
        });
        let hash_db = test_hash_db().await;
        let cancel = Arc::new(cancel::Token::new());

        let report = verify(
            client,
            &hash_db,
            "song.mp3",
            10,
            vec!["ghost".into()],
            Duration::from_secs(1),
            cancel,
        )
        .await;

        assert!(report.groups.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].1,
            Error::FileTooSmallForVerification { .. }
        ));
    }
}
