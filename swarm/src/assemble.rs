//! Concatenates completed chunks into `output_path` and performs the final
//! hash check (spec section 4.3, "Assembly" / "Final verification").

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::plan::{scratch_path, Chunk};

/// Concatenates each chunk's scratch file, in index order, into a temporary
/// file next to `output_path`, then renames it into place. The rename only
/// happens once every chunk has been copied successfully, so a failure never
/// leaves a partial file at `output_path`.
pub async fn assemble(scratch_dir: &Path, chunks: &[Chunk], output_path: &Path) -> Result<()> {
    let tmp_path = output_path.with_extension("swarm-assembling");
    let result = assemble_into(scratch_dir, chunks, &tmp_path).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return result;
    }
    tokio::fs::rename(&tmp_path, output_path).await?;
    Ok(())
}

async fn assemble_into(scratch_dir: &Path, chunks: &[Chunk], tmp_path: &Path) -> Result<()> {
    let mut out = File::create(tmp_path).await?;
    for chunk in chunks {
        let mut part = File::open(scratch_path(scratch_dir, chunk)).await?;
        tokio::io::copy(&mut part, &mut out).await?;
    }
    out.flush().await?;
    Ok(())
}

/// The outcome of hashing the assembled file: its full-file SHA-256 (always
/// recorded) and whether it matched `expected`, when one was supplied and is
/// of a kind this function knows how to recompute.
pub struct FinalHash {
    pub full_sha256: [u8; 32],
}

/// Hashes the assembled file and, if `expected` is a [`fingerprint::Kind::Sha256Prefix`]
/// fingerprint, checks it against the SHA-256 of the same bounded prefix
/// [`fingerprint::fingerprint`] would have computed from the source peers.
/// `FlacStreamInfoMd5` fingerprints are not re-derived here; assembly
/// correctness for FLAC sources relies on the sources already agreeing during
/// `ContentVerification`.
pub async fn verify_final(
    output_path: &Path,
    expected: Option<&fingerprint::Fingerprint>,
) -> Result<FinalHash> {
    let full_sha256 = hash_whole_file(output_path).await?;

    if let Some(expected) = expected {
        if expected.kind() == fingerprint::Kind::Sha256Prefix {
            let prefix = hash_prefix(output_path, fingerprint::NON_FLAC_PREFIX_BYTES).await?;
            if prefix != expected.bytes() {
                return Err(Error::FinalHashMismatch);
            }
        }
    }

    Ok(FinalHash { full_sha256 })
}

async fn hash_whole_file(path: &Path) -> Result<[u8; 32]> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

async fn hash_prefix(path: &Path, prefix_len: usize) -> Result<Vec<u8>> {
    let mut file = File::open(path).await?;
    let mut buf = vec![0u8; prefix_len];
    let mut filled = 0usize;
    while filled < prefix_len {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(Sha256::digest(&buf).to_vec())
}
