//! Drives backfill cycles on a timer, gated by the idle requirement (spec
//! section 4.6).

use std::sync::Arc;

use hashdb::HashDb;
use tracing::debug;
use verification::TransferClient;

use crate::activity::ActivityTracker;
use crate::config::BackfillConfig;
use crate::cycle::run_cycle;
use crate::error::Result;
use crate::stats::BackfillStats;

/// Runs backfill cycles every `config.interval` until `cancel` fires. Each
/// tick is skipped (but still counted) if the system hasn't been idle of
/// user-initiated transfers for `config.min_idle`.
pub async fn run_loop(
    hash_db: HashDb,
    client: Arc<dyn TransferClient>,
    config: BackfillConfig,
    stats: Arc<BackfillStats>,
    activity: Arc<ActivityTracker>,
    cancel: Arc<cancel::Token>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(config.interval);
    loop {
        ticker.tick().await;
        if cancel.check_cancel().is_err() {
            return Ok(());
        }

        if activity.idle_for(std::time::Instant::now()) < config.min_idle {
            debug!("skipping backfill cycle: system not idle long enough");
            stats.record_cycle_skipped();
            continue;
        }

        run_cycle(&hash_db, &client, &config, &stats, &cancel).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use verification::{DownloadOptions, PeerAttributes, PeerId, TransferError};

    struct NoopClient;

    #[async_trait]
    impl TransferClient for NoopClient {
        async fn download(
            &self,
            _peer: &PeerId,
            _remote_path: &str,
            _sink: &mut (dyn tokio::io::AsyncWrite + Unpin + Send),
            _size: u64,
            _start_offset: u64,
            _options: DownloadOptions,
            _cancel: &cancel::Token,
        ) -> std::result::Result<u64, TransferError> {
            Err(TransferError::Transport("no peers in this fixture".into()))
        }

        async fn peer_attributes(&self, _peer: &PeerId) -> std::result::Result<PeerAttributes, TransferError> {
            Ok(PeerAttributes::default())
        }
    }

    #[tokio::test]
    async fn a_cycle_with_no_candidates_is_a_no_op() {
        let hash_db = HashDb::open_in_memory().await.unwrap();
        let client: Arc<dyn TransferClient> = Arc::new(NoopClient);
        let config = BackfillConfig::default();
        let stats = BackfillStats::new();
        let cancel = Arc::new(cancel::Token::new());

        run_cycle(&hash_db, &client, &config, &stats, &cancel).await.unwrap();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cycles_run, 1);
        assert_eq!(snapshot.probes_attempted, 0);
    }
}
