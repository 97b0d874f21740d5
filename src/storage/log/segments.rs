//! The live collection of segment files.
//!
//! Files are kept in version order. A range map routes every log index to
//! the file that currently owns it; files displaced by a truncate or skip stay
//! on disk (and in the version list) until pruning removes them.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::{
    error::{LogError, LogResult},
    types::{LogIndex, Term},
};

use super::{
    file_names::FileNames,
    header::SegmentHeader,
    range_map::{RangeMap, ValueRange},
    reader::ReaderPool,
    segment::{SegmentContext, SegmentFile},
};

/// Point-in-time view of one file, as consumed by pruning strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSummary {
    pub version: u64,
    pub header: SegmentHeader,
    pub size: u64,
    /// Entries of this file still reachable through the log.
    pub live_entries: u64,
}

struct SegmentsInner {
    all: Vec<Arc<SegmentFile>>,
    range_map: RangeMap<LogIndex, Arc<SegmentFile>>,
    next_version: u64,
}

pub struct Segments {
    file_names: FileNames,
    ctx: SegmentContext,
    inner: Mutex<SegmentsInner>,
}

impl Segments {
    /// Build the collection from recovered files, oldest first.
    pub fn new(
        file_names: FileNames,
        ctx: SegmentContext,
        segments: Vec<Arc<SegmentFile>>,
        next_version: u64,
    ) -> Self {
        let mut range_map = RangeMap::new();
        for segment in &segments {
            range_map.replace_from(segment.header().prev_index + 1, segment.clone());
        }
        Self {
            file_names,
            ctx,
            inner: Mutex::new(SegmentsInner {
                all: segments,
                range_map,
                next_version,
            }),
        }
    }

    /// Start a new file continuing directly after the current last entry.
    pub fn rotate(
        &self,
        prev_file_last_index: LogIndex,
        prev_index: LogIndex,
        prev_term: Term,
    ) -> LogResult<Arc<SegmentFile>> {
        if prev_file_last_index != prev_index {
            return Err(LogError::IllegalArgument(format!(
                "Rotation must continue the log: prev_file_last_index {} != prev_index {}",
                prev_file_last_index, prev_index
            )));
        }
        self.create_next(prev_file_last_index, prev_index, prev_term)
    }

    /// Start a new file that discards every entry after `prev_index`.
    pub fn truncate(
        &self,
        prev_file_last_index: LogIndex,
        prev_index: LogIndex,
        prev_term: Term,
    ) -> LogResult<Arc<SegmentFile>> {
        if prev_file_last_index < prev_index {
            return Err(LogError::IllegalArgument(format!(
                "Cannot truncate at {} beyond the last index {}",
                prev_index, prev_file_last_index
            )));
        }
        if prev_file_last_index == prev_index {
            warn!("Truncating at the last index {}, nothing is discarded", prev_index);
        }
        self.create_next(prev_file_last_index, prev_index, prev_term)
    }

    /// Start a new file that jumps the log forward to `prev_index`.
    pub fn skip(
        &self,
        prev_file_last_index: LogIndex,
        prev_index: LogIndex,
        prev_term: Term,
    ) -> LogResult<Arc<SegmentFile>> {
        if prev_file_last_index > prev_index {
            return Err(LogError::IllegalArgument(format!(
                "Cannot skip backwards from {} to {}",
                prev_file_last_index, prev_index
            )));
        }
        if prev_file_last_index == prev_index {
            warn!("Skipping to the last index {}, nothing is skipped", prev_index);
        }
        self.create_next(prev_file_last_index, prev_index, prev_term)
    }

    fn create_next(
        &self,
        prev_file_last_index: LogIndex,
        prev_index: LogIndex,
        prev_term: Term,
    ) -> LogResult<Arc<SegmentFile>> {
        let mut inner = self.inner.lock();
        let version = inner.next_version;
        let header = SegmentHeader::new(prev_file_last_index, version, prev_index, prev_term);
        let segment = Arc::new(SegmentFile::create(
            self.file_names.path_for_version(version),
            header,
            self.ctx.clone(),
        )?);

        inner.next_version += 1;
        inner.all.push(segment.clone());
        let displaced = inner.range_map.replace_from(prev_index + 1, segment.clone());
        if !displaced.is_empty() {
            info!(
                "Segment version {} supersedes {} segment(s) from index {}",
                version,
                displaced.len(),
                prev_index + 1
            );
        }
        Ok(segment)
    }

    /// The file owning `index` and the first index it no longer owns.
    pub fn get_for_index(&self, index: LogIndex) -> ValueRange<LogIndex, Arc<SegmentFile>> {
        self.inner.lock().range_map.lookup(index)
    }

    pub fn last(&self) -> Option<Arc<SegmentFile>> {
        self.inner.lock().all.last().cloned()
    }

    /// Dispose the oldest files whose live entries all lie at or below
    /// `prune_index`. The tail is always kept and pruning stops at the first
    /// file that is still in use, so what remains stays contiguous.
    ///
    /// Returns the header of the file now owning the lowest indices when
    /// anything was removed.
    pub fn prune(&self, prune_index: LogIndex) -> Option<SegmentHeader> {
        let mut inner = self.inner.lock();
        let live_ends = live_ends(&inner.all);
        let mut disposed = 0;

        // the tail is never a candidate
        let candidates = inner.all.len().saturating_sub(1);
        for (segment, &live_end) in inner.all.iter().zip(&live_ends).take(candidates) {
            if live_end > prune_index {
                break;
            }
            if !segment.try_close() {
                warn!(
                    "Segment version {} is still in use, pruning stops before index {}",
                    segment.version(),
                    prune_index
                );
                break;
            }
            if let Err(e) = segment.delete() {
                error!(
                    "Disposed segment version {} could not be deleted: {}",
                    segment.version(),
                    e
                );
            }
            self.ctx.reader_pool.prune_version(segment.version());
            disposed += 1;
        }

        if disposed == 0 {
            return None;
        }

        let removed: Vec<_> = inner.all.drain(..disposed).collect();
        if let Some(oldest) = inner.all.first().cloned() {
            inner.range_map.remove(oldest.header().prev_index + 1);
        }
        let (_, first) = inner.range_map.first()?;
        info!(
            "Pruned {} segment file(s) up to version {}, log now starts after {}",
            removed.len(),
            removed.last().map_or(0, |s| s.version()),
            first.header().prev_index
        );
        Some(*first.header())
    }

    pub fn summaries(&self) -> Vec<SegmentSummary> {
        let inner = self.inner.lock();
        inner
            .all
            .iter()
            .zip(live_ends(&inner.all))
            .map(|(segment, live_end)| {
                let header = *segment.header();
                SegmentSummary {
                    version: header.version,
                    header,
                    size: segment.size(),
                    live_entries: (live_end - header.prev_index).max(0) as u64,
                }
            })
            .collect()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().all.len()
    }

    pub fn disk_usage(&self) -> u64 {
        self.inner.lock().all.iter().map(|s| s.size()).sum()
    }

    pub fn reader_pool(&self) -> &Arc<ReaderPool> {
        &self.ctx.reader_pool
    }

    /// Close every writer and dispose every idle file, then close the reader
    /// pool. Files with open cursors are left to their cursors.
    pub fn close(&self) -> LogResult<()> {
        let inner = self.inner.lock();
        let mut result = Ok(());
        for segment in &inner.all {
            if let Err(e) = segment.close_writer() {
                error!("Failed to close writer of segment version {}: {}", segment.version(), e);
                result = Err(e);
            }
            if !segment.is_disposed() && !segment.try_close() {
                warn!(
                    "Segment version {} still has open cursors at shutdown",
                    segment.version()
                );
            }
        }
        self.ctx.reader_pool.close();
        self.ctx.position_cache.clear();
        result
    }
}

/// Last index each file still owns: its own last record, capped by where any
/// later file took over. A file fully superseded by a truncate owns nothing.
fn live_ends(all: &[Arc<SegmentFile>]) -> Vec<LogIndex> {
    let mut ends = vec![0; all.len()];
    let mut takeover = LogIndex::MAX;
    for (i, segment) in all.iter().enumerate().rev() {
        ends[i] = segment.last_index().min(takeover);
        takeover = takeover.min(segment.header().prev_index);
    }
    ends
}
