use std::sync::Arc;

use tracing::debug;

use crate::{
    error::LogResult,
    marshal::ContentMarshal,
    types::{LogIndex, NO_INDEX, RaftLogEntry},
};

use super::{entry::EntryRecord, segment::SegmentCursor, segments::Segments};

/// Forward-only walk over raw records that follows the index routing from
/// one segment file to the next.
pub struct EntryCursor {
    segments: Arc<Segments>,
    cursor: Option<SegmentCursor>,
    /// Index the next call to `next` produces.
    next_index: LogIndex,
    /// First index not owned by the file behind `cursor`.
    limit: LogIndex,
    current: Option<EntryRecord>,
    exhausted: bool,
}

impl EntryCursor {
    /// Open a cursor at `from_index`. The file owning `from_index` is pinned
    /// before this returns, so pruning cannot remove it while the cursor is
    /// alive. An index no file owns yields a cursor that is already exhausted.
    pub fn open(segments: Arc<Segments>, from_index: LogIndex) -> LogResult<Self> {
        let mut cursor = Self {
            segments,
            cursor: None,
            next_index: from_index,
            limit: from_index,
            current: None,
            exhausted: false,
        };
        if !cursor.switch_segment()? {
            debug!("No segment file owns index {}", from_index);
            cursor.exhausted = true;
        }
        Ok(cursor)
    }

    pub fn next(&mut self) -> LogResult<bool> {
        self.current = None;
        if self.exhausted {
            return Ok(false);
        }
        if (self.cursor.is_none() || self.next_index >= self.limit) && !self.switch_segment()? {
            self.finish();
            return Ok(false);
        }

        let Some(cursor) = self.cursor.as_mut() else {
            self.finish();
            return Ok(false);
        };
        if cursor.next()? {
            self.current = cursor.take_current();
            self.next_index += 1;
            Ok(true)
        } else {
            self.finish();
            Ok(false)
        }
    }

    /// Move to the file owning `next_index`. The new file's cursor is opened
    /// before the old one is released, and a file that was already disposed
    /// surfaces as [`crate::error::LogError::Disposed`].
    fn switch_segment(&mut self) -> LogResult<bool> {
        let range = self.segments.get_for_index(self.next_index);
        let Some(segment) = range.value else {
            return Ok(false);
        };

        let cursor = segment.get_cursor(self.next_index)?;
        self.limit = range.limit.unwrap_or(LogIndex::MAX);
        if let Some(mut previous) = self.cursor.replace(cursor) {
            previous.close();
        }
        Ok(true)
    }

    fn finish(&mut self) {
        self.exhausted = true;
        self.close();
    }

    pub fn current(&self) -> Option<&EntryRecord> {
        self.current.as_ref()
    }

    pub fn take_current(&mut self) -> Option<EntryRecord> {
        self.current.take()
    }

    pub fn close(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }
}

struct CursorSource<C> {
    entries: EntryCursor,
    marshal: Arc<dyn ContentMarshal<C>>,
}

/// Cursor handed to the consensus engine: decoded entries in index order.
pub struct RaftLogCursor<C> {
    source: Option<CursorSource<C>>,
    index: LogIndex,
    entry: Option<RaftLogEntry<C>>,
}

impl<C> RaftLogCursor<C> {
    pub(crate) fn new(entries: EntryCursor, marshal: Arc<dyn ContentMarshal<C>>) -> Self {
        Self {
            source: Some(CursorSource { entries, marshal }),
            index: NO_INDEX,
            entry: None,
        }
    }

    /// A cursor whose first `next` returns `false`.
    pub fn empty() -> Self {
        Self {
            source: None,
            index: NO_INDEX,
            entry: None,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> LogResult<bool> {
        self.entry = None;
        let Some(source) = self.source.as_mut() else {
            return Ok(false);
        };
        if !source.entries.next()? {
            return Ok(false);
        }
        let Some(record) = source.entries.take_current() else {
            return Ok(false);
        };

        let content = source.marshal.unmarshal(&record.payload)?;
        self.index = record.index;
        self.entry = Some(RaftLogEntry::new(record.term, content));
        Ok(true)
    }

    /// Index of the current entry, `-1` before the first `next`.
    pub fn index(&self) -> LogIndex {
        self.index
    }

    pub fn entry(&self) -> Option<&RaftLogEntry<C>> {
        self.entry.as_ref()
    }

    pub fn take_entry(&mut self) -> Option<RaftLogEntry<C>> {
        self.entry.take()
    }

    /// Release all file resources. Safe to call more than once.
    pub fn close(&mut self) {
        self.entry = None;
        if let Some(mut source) = self.source.take() {
            source.entries.close();
        }
    }
}
