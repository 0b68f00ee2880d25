//! Content fingerprinting for the swarm downloader and hash mesh.
//!
//! A fingerprint is a compact, content-addressed identifier for a file's bytes,
//! computed from a bounded prefix of the file rather than its full contents.
//! Two kinds of fingerprint exist:
//!
//! - [`Kind::FlacStreamInfoMd5`]: the audio MD5 embedded in a FLAC file's
//!   `STREAMINFO` metadata block. Two FLAC files with the same `STREAMINFO`
//!   MD5 have byte-identical decoded audio, even if their containers differ
//!   (tags, padding, etc).
//! - [`Kind::Sha256Prefix`]: SHA-256 over the first `min(size, prefix_len)`
//!   bytes of any other file.
//!
//! Fingerprints of different kinds are never considered equal, even if their
//! bytes happen to coincide; [`Fingerprint`] carries the kind alongside the
//! digest for exactly this reason.

use std::{fmt::Display, path::Path};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

mod flac;

/// The FLAC prefix bound: stream marker + metadata block header + `STREAMINFO`
/// comfortably fits in a few dozen bytes, but real-world files occasionally
/// carry leading padding or oversized vendor blocks before it, so the policy
/// bound is generous.
pub const FLAC_PREFIX_BYTES: usize = 64 * 1024;

/// The prefix bound used for every non-FLAC file.
pub const NON_FLAC_PREFIX_BYTES: usize = 32 * 1024;

/// Errors that may be encountered while fingerprinting a probed prefix.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The file declares itself FLAC (by name) but its header, marker, or
    /// metadata block framing does not parse.
    #[error("malformed FLAC header: {0}")]
    MalformedHeader(String),

    /// The resulting digest was not the expected number of bytes. Indicates a
    /// bug in this crate, not bad input.
    #[error("invariant: hash digest had unexpected size")]
    InvariantDigestSize,
}

/// The two fingerprint algorithms this system understands.
///
/// Kinds MUST maintain exact implementation compatibility once crawled
/// fingerprints exist under them; changing the algorithm for a kind requires
/// introducing a new kind instead.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum Kind {
    /// The FLAC `STREAMINFO` audio MD5 (16 bytes).
    FlacStreamInfoMd5,
    /// SHA-256 over a bounded file prefix (32 bytes).
    Sha256Prefix,
}

impl Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::FlacStreamInfoMd5 => write!(f, "flac_streaminfo_md5"),
            Kind::Sha256Prefix => write!(f, "sha_256_prefix"),
        }
    }
}

/// Codec hints extracted as a side effect of FLAC fingerprinting.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct CodecMeta {
    pub sample_rate_hz: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    pub total_samples: u64,
}

impl CodecMeta {
    /// Packs the common cases into `FingerprintEntry::meta_flags`: bit 0
    /// marks that codec hints are present at all, bits 1-3 bucket the
    /// sample rate, bits 4-7 carry the channel count (capped at 15), and
    /// bits 8-9 bucket the bit depth. `total_samples` does not fit a flag
    /// word and is not carried; it stays a probe-local detail.
    pub fn pack(&self) -> u32 {
        let sample_class: u32 = match self.sample_rate_hz {
            44_100 => 1,
            48_000 => 2,
            88_200 => 3,
            96_000 => 4,
            176_400 => 5,
            192_000 => 6,
            _ => 7,
        };
        let bits_class: u32 = match self.bits_per_sample {
            16 => 1,
            24 => 2,
            32 => 3,
            _ => 0,
        };
        let channels = u32::from(self.channels.min(15));
        1 | (sample_class << 1) | (channels << 4) | (bits_class << 8)
    }
}

/// A fingerprint: a kind tag plus its digest bytes.
///
/// `PartialEq`/`Hash` consider the kind, so fingerprints of different kinds
/// are never equal even if their bytes happen to coincide.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct Fingerprint {
    kind: Kind,
    bytes: Vec<u8>,
}

impl Fingerprint {
    fn new(kind: Kind, bytes: Vec<u8>) -> Self {
        Self { kind, bytes }
    }

    /// Reconstructs a fingerprint from a previously validated kind and digest,
    /// e.g. when reading one back out of storage.
    pub fn from_parts(kind: Kind, bytes: Vec<u8>) -> Self {
        Self::new(kind, bytes)
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, hex::encode(&self.bytes))
    }
}

/// Returns the number of leading bytes a caller must read from `path` in
/// order to fingerprint it. Capped by the file's actual size by the caller.
pub fn minimum_prefix_bytes(path: &Path) -> usize {
    if is_flac_name(path) {
        FLAC_PREFIX_BYTES
    } else {
        NON_FLAC_PREFIX_BYTES
    }
}

/// Fingerprint a probed prefix of a file.
///
/// `prefix_bytes` must be exactly the bytes read from byte `0` of the file,
/// up to `min(size, minimum_prefix_bytes(path))`. `path` supplies the declared
/// format (by its extension); this function does no I/O itself.
pub fn fingerprint(
    prefix_bytes: &[u8],
    path: &Path,
) -> Result<(Kind, Vec<u8>, Option<CodecMeta>), Error> {
    if is_flac_name(path) {
        let (md5, meta) = flac::stream_info_md5(prefix_bytes)?;
        Ok((Kind::FlacStreamInfoMd5, md5.to_vec(), Some(meta)))
    } else {
        let digest = Sha256::digest(prefix_bytes);
        let bytes: [u8; 32] = digest
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvariantDigestSize)?;
        Ok((Kind::Sha256Prefix, bytes.to_vec(), None))
    }
}

/// Convenience wrapper around [`fingerprint`] that returns a [`Fingerprint`].
pub fn fingerprint_typed(
    prefix_bytes: &[u8],
    path: &Path,
) -> Result<(Fingerprint, Option<CodecMeta>), Error> {
    let (kind, bytes, meta) = fingerprint(prefix_bytes, path)?;
    Ok((Fingerprint::new(kind, bytes), meta))
}

fn is_flac_name(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("flac"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn minimum_prefix_bytes_flac_vs_other() {
        assert_eq!(
            minimum_prefix_bytes(&PathBuf::from("song.flac")),
            FLAC_PREFIX_BYTES
        );
        assert_eq!(
            minimum_prefix_bytes(&PathBuf::from("SONG.FLAC")),
            FLAC_PREFIX_BYTES
        );
        assert_eq!(
            minimum_prefix_bytes(&PathBuf::from("song.mp3")),
            NON_FLAC_PREFIX_BYTES
        );
        assert_eq!(
            minimum_prefix_bytes(&PathBuf::from("song")),
            NON_FLAC_PREFIX_BYTES
        );
    }

    #[test]
    fn sha256_prefix_is_deterministic() {
        let data = b"hello world".repeat(100);
        let path = PathBuf::from("clip.mp3");
        let (kind_a, bytes_a, meta_a) = fingerprint(&data, &path).expect("fingerprint");
        let (kind_b, bytes_b, meta_b) = fingerprint(&data, &path).expect("fingerprint");
        assert_eq!(kind_a, kind_b);
        assert_eq!(bytes_a, bytes_b);
        assert!(meta_a.is_none());
        assert!(meta_b.is_none());
        assert_eq!(kind_a, Kind::Sha256Prefix);
        assert_eq!(bytes_a.len(), 32);
    }

    #[test]
    fn different_kinds_never_equal() {
        let flac = Fingerprint::new(Kind::FlacStreamInfoMd5, vec![0xAB; 16]);
        let other = Fingerprint::new(Kind::Sha256Prefix, {
            let mut v = vec![0u8; 32];
            v[..16].copy_from_slice(&[0xAB; 16]);
            v
        });
        assert_ne!(flac, other);
    }

    #[test]
    fn non_flac_file_smaller_than_bound_hashes_whole_file() {
        let data = b"short".to_vec();
        let path = PathBuf::from("tiny.bin");
        let (_, bytes, _) = fingerprint(&data, &path).expect("fingerprint");
        assert_eq!(bytes, Sha256::digest(&data).to_vec());
    }
}
