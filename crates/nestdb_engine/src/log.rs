//! Append-only persistence log for the reference engine.
//!
//! Committed write groups are framed as
//! `[payload_len u32][crc32 u32][payload]` records behind a
//! `magic || version` file header. Replay applies whole groups in order and
//! stops at the first torn or corrupt record, so a crash mid-append loses at
//! most the unsynced tail.

use crate::engine::BatchOp;
use crate::error::{EngineError, EngineResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes identifying an engine log file.
pub const LOG_MAGIC: [u8; 4] = *b"NENG";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

const OP_PUT: u8 = 1;
const OP_DEL: u8 = 2;

/// Reflected CRC-32 (the ISO-HDLC polynomial) over `data`.
///
/// Uses a 16-entry nibble table, consuming each input byte in two
/// half-byte steps.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const REFLECTED_POLY: u32 = 0xEDB8_8320;
    const NIBBLE_LUT: [u32; 16] = {
        let mut lut = [0u32; 16];
        let mut nibble = 0usize;
        while nibble < 16 {
            let mut rem = nibble as u32;
            let mut step = 0;
            while step < 4 {
                let feedback = if rem & 1 == 1 { REFLECTED_POLY } else { 0 };
                rem = (rem >> 1) ^ feedback;
                step += 1;
            }
            lut[nibble] = rem;
            nibble += 1;
        }
        lut
    };

    let mut state = u32::MAX;
    for &input in data {
        state ^= u32::from(input);
        state = (state >> 4) ^ NIBBLE_LUT[(state & 0x0F) as usize];
        state = (state >> 4) ^ NIBBLE_LUT[(state & 0x0F) as usize];
    }
    !state
}

/// Serializes one committed write group.
fn encode_group(ops: &[BatchOp]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(ops.len() as u32).to_le_bytes());
    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                buf.push(OP_PUT);
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
                buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
                buf.extend_from_slice(value);
            }
            BatchOp::Del { key } => {
                buf.push(OP_DEL);
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
            }
        }
    }
    buf
}

/// Deserializes one write group payload.
fn decode_group(payload: &[u8]) -> EngineResult<Vec<BatchOp>> {
    let mut cursor = 0usize;

    let count = read_u32(payload, &mut cursor)? as usize;
    let mut ops = Vec::with_capacity(count);
    for _ in 0..count {
        let tag = *payload
            .get(cursor)
            .ok_or_else(|| EngineError::corruption("truncated op tag"))?;
        cursor += 1;
        match tag {
            OP_PUT => {
                let key = read_bytes(payload, &mut cursor)?;
                let value = read_bytes(payload, &mut cursor)?;
                ops.push(BatchOp::Put { key, value });
            }
            OP_DEL => {
                let key = read_bytes(payload, &mut cursor)?;
                ops.push(BatchOp::Del { key });
            }
            other => {
                return Err(EngineError::corruption(format!("unknown op tag {other}")));
            }
        }
    }
    if cursor != payload.len() {
        return Err(EngineError::corruption("trailing bytes in write group"));
    }
    Ok(ops)
}

fn read_u32(buf: &[u8], cursor: &mut usize) -> EngineResult<u32> {
    let end = *cursor + 4;
    let bytes: [u8; 4] = buf
        .get(*cursor..end)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| EngineError::corruption("truncated length field"))?;
    *cursor = end;
    Ok(u32::from_le_bytes(bytes))
}

fn read_bytes(buf: &[u8], cursor: &mut usize) -> EngineResult<Vec<u8>> {
    let len = read_u32(buf, cursor)? as usize;
    let end = *cursor + len;
    let bytes = buf
        .get(*cursor..end)
        .ok_or_else(|| EngineError::corruption("truncated byte field"))?;
    *cursor = end;
    Ok(bytes.to_vec())
}

/// The engine's append-only log file.
#[derive(Debug)]
pub struct Log {
    path: PathBuf,
    file: File,
}

impl Log {
    /// Opens or creates the log, replaying any committed groups.
    ///
    /// Returns the open log positioned for appends along with the replayed
    /// groups in commit order. A torn or corrupt tail is dropped with a
    /// warning and the file truncated back to its last whole record.
    pub fn open(path: &Path) -> EngineResult<(Self, Vec<Vec<BatchOp>>)> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let groups = if data.is_empty() {
            let mut header = Vec::with_capacity(6);
            header.extend_from_slice(&LOG_MAGIC);
            header.extend_from_slice(&LOG_VERSION.to_le_bytes());
            file.write_all(&header)?;
            file.sync_all()?;
            Vec::new()
        } else {
            let (groups, valid_len) = Self::replay(&data)?;
            if valid_len < data.len() as u64 {
                warn!(
                    path = %path.display(),
                    dropped = data.len() as u64 - valid_len,
                    "dropping torn tail from engine log"
                );
                file.set_len(valid_len)?;
                file.sync_all()?;
            }
            groups
        };

        file.seek(SeekFrom::End(0))?;
        Ok((
            Self {
                path: path.to_path_buf(),
                file,
            },
            groups,
        ))
    }

    /// Parses the log body, returning whole groups and the length of the
    /// valid prefix.
    fn replay(data: &[u8]) -> EngineResult<(Vec<Vec<BatchOp>>, u64)> {
        if data.len() < 6 || data[..4] != LOG_MAGIC {
            return Err(EngineError::corruption("bad log header"));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != LOG_VERSION {
            return Err(EngineError::corruption(format!(
                "unsupported log version {version}"
            )));
        }

        let mut groups = Vec::new();
        let mut pos = 6usize;
        while pos < data.len() {
            let Some(frame) = data.get(pos..pos + 8) else {
                break;
            };
            let len = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
            let crc = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
            let Some(payload) = data.get(pos + 8..pos + 8 + len) else {
                break;
            };
            if compute_crc32(payload) != crc {
                break;
            }
            groups.push(decode_group(payload)?);
            pos += 8 + len;
        }

        Ok((groups, pos as u64))
    }

    /// Appends one committed write group.
    pub fn append(&mut self, ops: &[BatchOp], sync: bool) -> EngineResult<()> {
        let payload = encode_group(ops);
        let mut record = Vec::with_capacity(8 + payload.len());
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
        record.extend_from_slice(&payload);

        self.file.write_all(&record)?;
        if sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Forces all appended groups to durable storage.
    pub fn sync(&mut self) -> EngineResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
