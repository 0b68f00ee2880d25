use std::path::Path;
use std::time::{Duration, Instant};

use fingerprint::CodecMeta;

use crate::bounded_writer::{BoundedWriter, MemSink};
use crate::client::{DownloadOptions, PeerId, TransferClient, TransferError};
use crate::error::{Error, Result};

/// A successful probe: the fingerprint it produced, any codec hints, and how
/// long the probe took (used to order sources within a fingerprint group).
#[derive(Clone, Debug)]
pub struct ProbeSuccess {
    pub fingerprint: fingerprint::Fingerprint,
    pub codec_meta: Option<CodecMeta>,
    pub duration: Duration,
}

/// Probes one candidate peer for `filename`/`size`, isolated from any other
/// concurrent probe: this function never propagates another probe's failure.
pub async fn probe_peer(
    client: &dyn TransferClient,
    peer: &PeerId,
    filename: &str,
    size: u64,
    probe_timeout: Duration,
    cancel: &cancel::Token,
) -> Result<ProbeSuccess> {
    if cancel.check_cancel().is_err() {
        return Err(Error::Cancelled);
    }

    let path = Path::new(filename);
    let required = fingerprint::minimum_prefix_bytes(path) as u64;
    if size < required {
        return Err(Error::FileTooSmallForVerification { size, required });
    }

    let started = Instant::now();
    let fut = run_probe(client, peer, filename, size, required, cancel);
    let outcome = tokio::time::timeout(probe_timeout, fut)
        .await
        .map_err(|_| Error::Timeout)??;
    let (kind, bytes, codec_meta) = outcome;

    Ok(ProbeSuccess {
        fingerprint: fingerprint::Fingerprint::from_parts(kind, bytes),
        codec_meta,
        duration: started.elapsed(),
    })
}

async fn run_probe(
    client: &dyn TransferClient,
    peer: &PeerId,
    filename: &str,
    size: u64,
    required: u64,
    cancel: &cancel::Token,
) -> Result<(fingerprint::Kind, Vec<u8>, Option<CodecMeta>)> {
    let mut sink = BoundedWriter::new(MemSink::default(), required);
    client
        .download(
            peer,
            filename,
            &mut sink,
            size,
            0,
            DownloadOptions::default(),
            cancel,
        )
        .await
        .map_err(|e| match e {
            TransferError::RemoteRejected { start_offset } => {
                Error::RemoteRejected(format!("peer rejected start_offset {start_offset}"))
            }
            TransferError::Transport(msg) => Error::TransportError(msg),
            TransferError::Cancelled => Error::Cancelled,
        })?;

    let buf = sink.into_inner().0;
    let path = Path::new(filename);
    fingerprint::fingerprint(&buf, path).map_err(Error::from)
}
