use std::io::{self, ErrorKind, Read};

use tracing::warn;

use crate::{
    error::{LogError, LogResult},
    types::{LogIndex, Term},
};

// EntryRecord layout:
// | index (i64) | term (i64) | payload len (u32) | crc (u32) | payload ... |
// crc covers index, term, len and payload.

pub const RECORD_HEADER_SIZE: u64 = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub index: LogIndex,
    pub term: Term,
    pub payload: Vec<u8>,
}

impl EntryRecord {
    pub fn new(index: LogIndex, term: Term, payload: Vec<u8>) -> Self {
        Self {
            index,
            term,
            payload,
        }
    }

    pub fn encoded_len(&self) -> u64 {
        RECORD_HEADER_SIZE + self.payload.len() as u64
    }

    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        let mut prefix = [0u8; 20];
        prefix[0..8].copy_from_slice(&self.index.to_le_bytes());
        prefix[8..16].copy_from_slice(&self.term.to_le_bytes());
        prefix[16..20].copy_from_slice(&(self.payload.len() as u32).to_le_bytes());

        buf.reserve(self.encoded_len() as usize);
        buf.extend_from_slice(&prefix);
        buf.extend_from_slice(&checksum(&prefix, &self.payload).to_le_bytes());
        buf.extend_from_slice(&self.payload);
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Read the record starting at `offset` (used for diagnostics only).
    ///
    /// Returns `Ok(None)` when the stream ends before a whole record is
    /// available: a clean end of file and a torn tail look the same.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R, offset: u64) -> LogResult<Option<Self>> {
        let mut header = [0u8; RECORD_HEADER_SIZE as usize];
        if !read_fully(reader, &mut header)? {
            return Ok(None);
        }

        let index = i64::from_le_bytes(field8(&header, 0));
        let term = i64::from_le_bytes(field8(&header, 8));
        let len = u32::from_le_bytes(field4(&header, 16));
        let crc = u32::from_le_bytes(field4(&header, 20));

        let mut payload = Vec::new();
        let read = (&mut *reader).take(len as u64).read_to_end(&mut payload)?;
        if read < len as usize {
            return Ok(None);
        }

        if checksum(&header[0..20], &payload) != crc {
            warn!(
                "Checksum mismatch for entry record at offset {} (index {})",
                offset, index
            );
            return Err(LogError::ChecksumMismatch { index, offset });
        }

        Ok(Some(Self {
            index,
            term,
            payload,
        }))
    }
}

fn checksum(prefix: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(prefix);
    hasher.update(payload);
    hasher.finalize()
}

fn field8(data: &[u8], at: usize) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    bytes
}

fn field4(data: &[u8], at: usize) -> [u8; 4] {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[at..at + 4]);
    bytes
}

/// Fill `buf` completely. `Ok(false)` if the stream ended first.
fn read_fully<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
