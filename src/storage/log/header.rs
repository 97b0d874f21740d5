use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::Path,
};

use crate::{
    error::LogResult,
    types::{LogIndex, Term},
};

/// Four little-endian 64-bit integers.
pub const SEGMENT_HEADER_SIZE: u64 = 32;

/// Continuity link written at the start of every segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Append index of the log when this file was created.
    pub prev_file_last_index: LogIndex,
    pub version: u64,
    /// Index immediately preceding this file's first entry.
    pub prev_index: LogIndex,
    pub prev_term: Term,
}

impl SegmentHeader {
    pub fn new(
        prev_file_last_index: LogIndex,
        version: u64,
        prev_index: LogIndex,
        prev_term: Term,
    ) -> Self {
        Self {
            prev_file_last_index,
            version,
            prev_index,
            prev_term,
        }
    }

    pub fn serialize(&self) -> [u8; SEGMENT_HEADER_SIZE as usize] {
        let mut buf = [0u8; SEGMENT_HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&self.prev_file_last_index.to_le_bytes());
        buf[8..16].copy_from_slice(&self.version.to_le_bytes());
        buf[16..24].copy_from_slice(&self.prev_index.to_le_bytes());
        buf[24..32].copy_from_slice(&self.prev_term.to_le_bytes());
        buf
    }

    /// `None` if `data` is too short to hold a header.
    pub fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < SEGMENT_HEADER_SIZE as usize {
            return None;
        }
        let field = |at: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[at..at + 8]);
            bytes
        };
        Some(Self {
            prev_file_last_index: i64::from_le_bytes(field(0)),
            version: u64::from_le_bytes(field(8)),
            prev_index: i64::from_le_bytes(field(16)),
            prev_term: i64::from_le_bytes(field(24)),
        })
    }

    /// Read the header of an existing file; `None` if the file is shorter
    /// than a header.
    pub fn read_from(path: &Path) -> LogResult<Option<Self>> {
        let mut file = File::open(path)?;
        let mut buf = Vec::with_capacity(SEGMENT_HEADER_SIZE as usize);
        std::io::Read::by_ref(&mut file)
            .take(SEGMENT_HEADER_SIZE)
            .read_to_end(&mut buf)?;
        Ok(Self::deserialize(&buf))
    }

    /// Replace whatever the file holds with just this header.
    pub fn rewrite(&self, path: &Path) -> LogResult<()> {
        let mut file = OpenOptions::new().write(true).open(path)?;
        file.set_len(0)?;
        file.write_all(&self.serialize())?;
        file.sync_data()?;
        Ok(())
    }
}

impl std::fmt::Display for SegmentHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SegmentHeader{{prev_file_last_index={}, version={}, prev_index={}, prev_term={}}}",
            self.prev_file_last_index, self.version, self.prev_index, self.prev_term
        )
    }
}
