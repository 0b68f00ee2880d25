//! Tagged-union wire framing for mesh messages (spec section 6, "Wire format
//! for mesh messages"): a 1-byte discriminator, length-prefixed UTF-8
//! strings, little-endian integers, and a 64 KiB cap on every encoded frame.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use fingerprint::{Fingerprint, Kind};

use crate::error::{Error, Result};

/// No encoded frame may exceed this many bytes.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

const TAG_HELLO: u8 = 0;
const TAG_REQ_DELTA: u8 = 1;
const TAG_PUSH_DELTA: u8 = 2;
const TAG_REQ_KEY: u8 = 3;
const TAG_RESP_KEY: u8 = 4;

const KIND_FLAC_STREAMINFO_MD5: u8 = 0;
const KIND_SHA256_PREFIX: u8 = 1;

/// One row of a `PUSH_DELTA` batch.
#[derive(Clone, Debug, PartialEq)]
pub struct DeltaEntry {
    pub seq: u64,
    pub key: String,
    pub fingerprint: Fingerprint,
    pub size: u64,
    pub meta_flags: u32,
}

/// A mesh protocol message.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Hello {
        client_id: String,
        protocol_version: u32,
        latest_local_seq: u64,
    },
    ReqDelta {
        since_seq: u64,
        max_entries: u32,
    },
    PushDelta {
        entries: Vec<DeltaEntry>,
    },
    ReqKey {
        key: String,
    },
    RespKey {
        key: String,
        fingerprint: Option<Fingerprint>,
        size: Option<u64>,
    },
}

impl Message {
    /// Encodes this message, failing if the result would exceed
    /// [`MAX_FRAME_BYTES`]. Callers assembling a `PUSH_DELTA` from an
    /// unbounded entry list should use [`encode_push_delta_capped`] instead,
    /// which trims the batch to fit rather than erroring.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Message::Hello { client_id, protocol_version, latest_local_seq } => {
                buf.write_u8(TAG_HELLO).unwrap();
                write_string(&mut buf, client_id);
                buf.write_u32::<LittleEndian>(*protocol_version).unwrap();
                buf.write_u64::<LittleEndian>(*latest_local_seq).unwrap();
            }
            Message::ReqDelta { since_seq, max_entries } => {
                buf.write_u8(TAG_REQ_DELTA).unwrap();
                buf.write_u64::<LittleEndian>(*since_seq).unwrap();
                buf.write_u32::<LittleEndian>(*max_entries).unwrap();
            }
            Message::PushDelta { entries } => {
                buf.write_u8(TAG_PUSH_DELTA).unwrap();
                buf.write_u32::<LittleEndian>(entries.len() as u32).unwrap();
                for entry in entries {
                    write_entry(&mut buf, entry);
                }
            }
            Message::ReqKey { key } => {
                buf.write_u8(TAG_REQ_KEY).unwrap();
                write_string(&mut buf, key);
            }
            Message::RespKey { key, fingerprint, size } => {
                buf.write_u8(TAG_RESP_KEY).unwrap();
                write_string(&mut buf, key);
                write_optional_fingerprint(&mut buf, fingerprint.as_ref());
                write_optional_u64(&mut buf, *size);
            }
        }
        if buf.len() > MAX_FRAME_BYTES {
            return Err(Error::FrameTooLarge { len: buf.len(), cap: MAX_FRAME_BYTES });
        }
        Ok(buf)
    }

    /// Decodes a single frame. Any structural problem (truncated buffer,
    /// unknown discriminator, invalid UTF-8, bad fingerprint kind) is a
    /// [`Error::ProtocolViolation`].
    pub fn decode(bytes: &[u8]) -> Result<Message> {
        let mut cursor = Cursor::new(bytes);
        let tag = read_u8(&mut cursor)?;
        let message = match tag {
            TAG_HELLO => Message::Hello {
                client_id: read_string(&mut cursor)?,
                protocol_version: read_u32(&mut cursor)?,
                latest_local_seq: read_u64(&mut cursor)?,
            },
            TAG_REQ_DELTA => Message::ReqDelta {
                since_seq: read_u64(&mut cursor)?,
                max_entries: read_u32(&mut cursor)?,
            },
            TAG_PUSH_DELTA => {
                let count = read_u32(&mut cursor)? as usize;
                let mut entries = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    entries.push(read_entry(&mut cursor)?);
                }
                Message::PushDelta { entries }
            }
            TAG_REQ_KEY => Message::ReqKey { key: read_string(&mut cursor)? },
            TAG_RESP_KEY => Message::RespKey {
                key: read_string(&mut cursor)?,
                fingerprint: read_optional_fingerprint(&mut cursor)?,
                size: read_optional_u64(&mut cursor)?,
            },
            other => return Err(Error::ProtocolViolation(format!("unknown message tag {other}"))),
        };
        Ok(message)
    }
}

/// Encodes as many of `entries` (which must already be in ascending `seq`
/// order) as fit within [`MAX_FRAME_BYTES`], greedily from the front.
/// Returns the encoded frame and how many entries it carries; the caller
/// advances its watermark only past the entries actually sent.
pub fn encode_push_delta_capped(entries: &[DeltaEntry]) -> (Vec<u8>, usize) {
    let mut buf = Vec::new();
    buf.write_u8(TAG_PUSH_DELTA).unwrap();
    let count_pos = buf.len();
    buf.write_u32::<LittleEndian>(0).unwrap();

    let mut included = 0usize;
    for entry in entries {
        let mut entry_buf = Vec::new();
        write_entry(&mut entry_buf, entry);
        if buf.len() + entry_buf.len() > MAX_FRAME_BYTES {
            break;
        }
        buf.extend_from_slice(&entry_buf);
        included += 1;
    }
    buf[count_pos..count_pos + 4].copy_from_slice(&(included as u32).to_le_bytes());
    (buf, included)
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.write_u32::<LittleEndian>(s.len() as u32).unwrap();
    buf.extend_from_slice(s.as_bytes());
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = read_u32(cursor)? as usize;
    let start = cursor.position() as usize;
    let bytes = cursor
        .get_ref()
        .get(start..start + len)
        .ok_or_else(|| Error::ProtocolViolation("truncated string".to_string()))?;
    cursor.set_position((start + len) as u64);
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::ProtocolViolation(e.to_string()))
}

fn write_fingerprint(buf: &mut Vec<u8>, fp: &Fingerprint) {
    let kind_tag = match fp.kind() {
        Kind::FlacStreamInfoMd5 => KIND_FLAC_STREAMINFO_MD5,
        Kind::Sha256Prefix => KIND_SHA256_PREFIX,
    };
    buf.write_u8(kind_tag).unwrap();
    buf.write_u32::<LittleEndian>(fp.bytes().len() as u32).unwrap();
    buf.extend_from_slice(fp.bytes());
}

fn read_fingerprint(cursor: &mut Cursor<&[u8]>) -> Result<Fingerprint> {
    let kind_tag = read_u8(cursor)?;
    let kind = match kind_tag {
        KIND_FLAC_STREAMINFO_MD5 => Kind::FlacStreamInfoMd5,
        KIND_SHA256_PREFIX => Kind::Sha256Prefix,
        other => return Err(Error::ProtocolViolation(format!("unknown fingerprint kind {other}"))),
    };
    let len = read_u32(cursor)? as usize;
    let start = cursor.position() as usize;
    let bytes = cursor
        .get_ref()
        .get(start..start + len)
        .ok_or_else(|| Error::ProtocolViolation("truncated fingerprint".to_string()))?
        .to_vec();
    cursor.set_position((start + len) as u64);
    Ok(Fingerprint::from_parts(kind, bytes))
}

fn write_optional_fingerprint(buf: &mut Vec<u8>, fp: Option<&Fingerprint>) {
    match fp {
        Some(fp) => {
            buf.write_u8(1).unwrap();
            write_fingerprint(buf, fp);
        }
        None => buf.write_u8(0).unwrap(),
    }
}

fn read_optional_fingerprint(cursor: &mut Cursor<&[u8]>) -> Result<Option<Fingerprint>> {
    match read_u8(cursor)? {
        0 => Ok(None),
        1 => Ok(Some(read_fingerprint(cursor)?)),
        other => Err(Error::ProtocolViolation(format!("invalid presence byte {other}"))),
    }
}

fn write_optional_u64(buf: &mut Vec<u8>, value: Option<u64>) {
    match value {
        Some(v) => {
            buf.write_u8(1).unwrap();
            buf.write_u64::<LittleEndian>(v).unwrap();
        }
        None => buf.write_u8(0).unwrap(),
    }
}

fn read_optional_u64(cursor: &mut Cursor<&[u8]>) -> Result<Option<u64>> {
    match read_u8(cursor)? {
        0 => Ok(None),
        1 => Ok(Some(read_u64(cursor)?)),
        other => Err(Error::ProtocolViolation(format!("invalid presence byte {other}"))),
    }
}

fn write_entry(buf: &mut Vec<u8>, entry: &DeltaEntry) {
    buf.write_u64::<LittleEndian>(entry.seq).unwrap();
    write_string(buf, &entry.key);
    write_fingerprint(buf, &entry.fingerprint);
    buf.write_u64::<LittleEndian>(entry.size).unwrap();
    buf.write_u32::<LittleEndian>(entry.meta_flags).unwrap();
}

fn read_entry(cursor: &mut Cursor<&[u8]>) -> Result<DeltaEntry> {
    Ok(DeltaEntry {
        seq: read_u64(cursor)?,
        key: read_string(cursor)?,
        fingerprint: read_fingerprint(cursor)?,
        size: read_u64(cursor)?,
        meta_flags: read_u32(cursor)?,
    })
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> Result<u8> {
    cursor.read_u8().map_err(|_| Error::ProtocolViolation("truncated frame".to_string()))
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::ProtocolViolation("truncated frame".to_string()))
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    cursor
        .read_u64::<LittleEndian>()
        .map_err(|_| Error::ProtocolViolation("truncated frame".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fingerprint() -> Fingerprint {
        Fingerprint::from_parts(Kind::Sha256Prefix, vec![0xAB; 32])
    }

    #[test]
    fn hello_round_trips() {
        let msg = Message::Hello {
            client_id: "node-a".to_string(),
            protocol_version: 1,
            latest_local_seq: 42,
        };
        let bytes = msg.encode().unwrap();
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn push_delta_round_trips_with_entries() {
        let msg = Message::PushDelta {
            entries: vec![DeltaEntry {
                seq: 7,
                key: "abc123".to_string(),
                fingerprint: sample_fingerprint(),
                size: 1024,
                meta_flags: 0,
            }],
        };
        let bytes = msg.encode().unwrap();
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn resp_key_round_trips_when_absent() {
        let msg = Message::RespKey { key: "missing".to_string(), fingerprint: None, size: None };
        let bytes = msg.encode().unwrap();
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn truncated_frame_is_a_protocol_violation() {
        let msg = Message::ReqKey { key: "k".to_string() };
        let mut bytes = msg.encode().unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(Message::decode(&bytes), Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn unknown_discriminator_is_a_protocol_violation() {
        assert!(matches!(Message::decode(&[0xFF]), Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn push_delta_capping_never_exceeds_the_frame_limit() {
        let entries: Vec<DeltaEntry> = (0..5000)
            .map(|i| DeltaEntry {
                seq: i,
                key: format!("key-{i:06}"),
                fingerprint: sample_fingerprint(),
                size: 123,
                meta_flags: 0,
            })
            .collect();
        let (bytes, included) = encode_push_delta_capped(&entries);
        assert!(bytes.len() <= MAX_FRAME_BYTES);
        assert!(included < entries.len());
        assert!(included > 0);
    }
}
