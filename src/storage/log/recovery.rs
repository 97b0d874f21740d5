//! Rebuilds the log state from the segment files on disk.
//!
//! Every file is replayed in version order: headers stitch the terms index
//! across rotations, truncations and skips, and every record is checked for
//! contiguity. Only the last file may be incomplete; its torn tail is trimmed
//! and a missing header is rewritten from what the previous file ended with.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufReader, Seek, SeekFrom},
    path::Path,
    sync::Arc,
};

use tracing::{info, warn};

use crate::{
    error::{LogError, LogResult},
    types::{LogIndex, NO_INDEX, NO_TERM, Term},
};

use super::{
    entry::EntryRecord,
    file_names::FileNames,
    header::{SEGMENT_HEADER_SIZE, SegmentHeader},
    segment::{SegmentContext, SegmentFile},
    segments::Segments,
    terms::Terms,
};

/// Logical boundaries of the log as found on disk.
pub struct RecoveryState {
    pub append_index: LogIndex,
    pub prev_index: LogIndex,
    pub prev_term: Term,
    pub terms: Terms,
    pub segments: Arc<Segments>,
}

pub struct RecoveryProtocol {
    file_names: FileNames,
    ctx: SegmentContext,
}

impl RecoveryProtocol {
    pub fn new(file_names: FileNames, ctx: SegmentContext) -> Self {
        Self { file_names, ctx }
    }

    pub fn run(&self) -> LogResult<RecoveryState> {
        let files = self.file_names.list()?;

        let Some((&first_version, _)) = files.first_key_value() else {
            info!(
                "No segment files in {:?}, starting an empty log",
                self.file_names.dir()
            );
            let segments = Arc::new(Segments::new(
                self.file_names.clone(),
                self.ctx.clone(),
                Vec::new(),
                0,
            ));
            segments.rotate(NO_INDEX, NO_INDEX, NO_TERM)?;
            return Ok(RecoveryState {
                append_index: NO_INDEX,
                prev_index: NO_INDEX,
                prev_term: NO_TERM,
                terms: Terms::new(NO_INDEX, NO_TERM),
                segments,
            });
        };

        for (expected, &version) in (first_version..).zip(files.keys()) {
            if version != expected {
                return Err(LogError::damaged(format!(
                    "Segment file version {} is missing, found {} instead",
                    expected, version
                )));
            }
        }
        let last_version = first_version + files.len() as u64 - 1;

        let mut terms: Option<Terms> = None;
        let mut append_index = NO_INDEX;
        let mut prev_index = NO_INDEX;
        let mut prev_term = NO_TERM;
        let mut recovered = Vec::with_capacity(files.len());

        for (version, path) in files {
            let is_last = version == last_version;
            let header = match SegmentHeader::read_from(&path)? {
                Some(header) => header,
                None if is_last => {
                    Self::rewrite_missing_header(version, &path, terms.as_ref(), append_index)?
                }
                None => {
                    return Err(LogError::damaged(format!(
                        "Segment file version {} has no header",
                        version
                    )));
                }
            };
            if header.version != version {
                return Err(LogError::damaged(format!(
                    "Segment file {:?} carries header version {}",
                    path, header.version
                )));
            }
            Self::check_index_bounds(&header)?;

            if let Some(terms) = terms.as_mut() {
                if header.prev_file_last_index != append_index {
                    return Err(LogError::damaged(format!(
                        "{} does not follow the previous file ending at {}",
                        header, append_index
                    )));
                }
                if header.prev_index < terms.lowest_index() || header.prev_index > append_index {
                    // a skip, or a truncate below everything still on disk
                    terms.skip(header.prev_index, header.prev_term);
                    prev_index = header.prev_index;
                    prev_term = header.prev_term;
                } else if header.prev_index < append_index {
                    terms.truncate(header.prev_index + 1).map_err(|e| {
                        LogError::damaged(format!("Cannot replay {}: {}", header, e))
                    })?;
                }
            } else {
                prev_index = header.prev_index;
                prev_term = header.prev_term;
            }
            let replayed =
                terms.get_or_insert_with(|| Terms::new(header.prev_index, header.prev_term));

            let (last_index, size) = Self::replay(&path, &header, replayed, is_last)?;
            append_index = last_index;
            recovered.push(Arc::new(SegmentFile::open(
                path,
                header,
                last_index,
                size,
                self.ctx.clone(),
            )));
        }

        let terms = terms.unwrap_or_else(|| Terms::new(NO_INDEX, NO_TERM));
        info!(
            "Recovered raft log: versions {}..={}, prev_index {}, prev_term {}, append_index {}",
            first_version, last_version, prev_index, prev_term, append_index
        );

        let segments = Arc::new(Segments::new(
            self.file_names.clone(),
            self.ctx.clone(),
            recovered,
            last_version + 1,
        ));
        Ok(RecoveryState {
            append_index,
            prev_index,
            prev_term,
            terms,
            segments,
        })
    }

    /// Header indices are either `-1` or a real index with room for the entry
    /// after it.
    fn check_index_bounds(header: &SegmentHeader) -> LogResult<()> {
        let valid = |index: LogIndex| (NO_INDEX..LogIndex::MAX).contains(&index);
        if valid(header.prev_index) && valid(header.prev_file_last_index) {
            Ok(())
        } else {
            Err(LogError::damaged(format!("{} has out of range indices", header)))
        }
    }

    /// Give the last file a header continuing from where the previous one
    /// ended. A lone headerless file is only acceptable as the very first one.
    fn rewrite_missing_header(
        version: u64,
        path: &Path,
        terms: Option<&Terms>,
        append_index: LogIndex,
    ) -> LogResult<SegmentHeader> {
        let header = match terms {
            Some(terms) => {
                SegmentHeader::new(append_index, version, append_index, terms.get(append_index))
            }
            None if version == 0 => SegmentHeader::new(NO_INDEX, 0, NO_INDEX, NO_TERM),
            None => {
                return Err(LogError::damaged(format!(
                    "Segment file version {} has no header and no predecessor",
                    version
                )));
            }
        };
        warn!("Rewriting missing header of segment file {:?} as {}", path, header);
        header.rewrite(path)?;
        Ok(header)
    }

    /// Read every record of one file into `terms`. Returns the last index and
    /// the byte length of the valid content.
    fn replay(
        path: &Path,
        header: &SegmentHeader,
        terms: &mut Terms,
        is_last: bool,
    ) -> LogResult<(LogIndex, u64)> {
        let mut reader = BufReader::new(File::open(path)?);
        reader.seek(SeekFrom::Start(SEGMENT_HEADER_SIZE))?;

        let mut offset = SEGMENT_HEADER_SIZE;
        let mut last_index = header.prev_index;
        loop {
            let record = match EntryRecord::read_from(&mut reader, offset) {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) if is_last && e.is_torn_record() => {
                    warn!("Stopping replay of {:?} at corrupt record: {}", path, e);
                    break;
                }
                Err(e) if e.is_torn_record() => {
                    return Err(LogError::damaged(format!(
                        "Corrupt record in segment file version {}: {}",
                        header.version, e
                    )));
                }
                Err(e) => return Err(e),
            };

            if last_index.checked_add(1) != Some(record.index) {
                return Err(LogError::damaged(format!(
                    "Segment file version {} holds entry {} after {}",
                    header.version, record.index, last_index
                )));
            }
            terms.append(record.index, record.term).map_err(|e| {
                LogError::damaged(format!(
                    "Segment file version {} breaks term order: {}",
                    header.version, e
                ))
            })?;
            last_index = record.index;
            offset += record.encoded_len();
        }

        let file_len = fs::metadata(path)?.len();
        if file_len > offset {
            if !is_last {
                return Err(LogError::damaged(format!(
                    "Segment file version {} has {} trailing bytes",
                    header.version,
                    file_len - offset
                )));
            }
            warn!(
                "Trimming {} bytes of torn tail from {:?}",
                file_len - offset,
                path
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(offset)?;
            file.sync_data()?;
        }
        Ok((last_index, offset))
    }
}
