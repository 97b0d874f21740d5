use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicI64, AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::{
    error::{LogError, LogResult},
    types::LogIndex,
};

use super::{
    entry::EntryRecord,
    header::{SEGMENT_HEADER_SIZE, SegmentHeader},
    position_cache::{LogPosition, PositionCache},
    reader::{Reader, ReaderPool},
    ref_count::ReferenceCounter,
};

// Segment file format:
// | SegmentHeader (32 bytes) | EntryRecord | EntryRecord | ... |
// Records are contiguous from header.prev_index + 1. A file may hold records
// past the point where a later file took over (after a truncate); those are
// never handed out because routing stops at the next range start.

/// Resources shared by every segment file of one log.
#[derive(Clone)]
pub struct SegmentContext {
    pub reader_pool: Arc<ReaderPool>,
    pub position_cache: Arc<PositionCache>,
    pub sync_on_flush: bool,
}

enum WriterState {
    /// Recovered file; the writer is opened on first write.
    Unopened,
    Open(BufWriter<File>),
    Closed,
}

pub struct SegmentFile {
    path: PathBuf,
    header: SegmentHeader,
    ctx: SegmentContext,
    /// One reference per open cursor plus one while the writer is open.
    ref_count: ReferenceCounter,
    writer: Mutex<WriterState>,
    /// Index of the last record physically present in the file.
    last_index: AtomicI64,
    size: AtomicU64,
}

impl SegmentFile {
    /// Create a new file holding only `header`. The writer starts open.
    pub(crate) fn create(path: PathBuf, header: SegmentHeader, ctx: SegmentContext) -> LogResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                warn!("Failed to create segment file {:?}: {}", path, e);
                e
            })?;

        let mut writer = BufWriter::new(file);
        writer.write_all(&header.serialize())?;
        writer.flush()?;
        if ctx.sync_on_flush {
            writer.get_ref().sync_data()?;
        }

        let segment = Self {
            path,
            header,
            ctx,
            ref_count: ReferenceCounter::new(),
            writer: Mutex::new(WriterState::Open(writer)),
            last_index: AtomicI64::new(header.prev_index),
            size: AtomicU64::new(SEGMENT_HEADER_SIZE),
        };
        segment.ref_count.increase();
        debug!("Created segment file {}", header);
        Ok(segment)
    }

    /// Adopt an existing, already validated file.
    pub(crate) fn open(
        path: PathBuf,
        header: SegmentHeader,
        last_index: LogIndex,
        size: u64,
        ctx: SegmentContext,
    ) -> Self {
        Self {
            path,
            header,
            ctx,
            ref_count: ReferenceCounter::new(),
            writer: Mutex::new(WriterState::Unopened),
            last_index: AtomicI64::new(last_index),
            size: AtomicU64::new(size),
        }
    }

    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    pub fn version(&self) -> u64 {
        self.header.version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_index(&self) -> LogIndex {
        self.last_index.load(Ordering::Acquire)
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn write(&self, record: &EntryRecord) -> LogResult<()> {
        let mut writer = self.writer.lock();
        if matches!(*writer, WriterState::Unopened) {
            if !self.ref_count.increase() {
                return Err(LogError::Disposed {
                    version: self.version(),
                });
            }
            match OpenOptions::new().append(true).open(&self.path) {
                Ok(file) => *writer = WriterState::Open(BufWriter::new(file)),
                Err(e) => {
                    self.ref_count.decrease();
                    warn!("Failed to open segment file {:?} for append: {}", self.path, e);
                    return Err(e.into());
                }
            }
        }

        let WriterState::Open(out) = &mut *writer else {
            return Err(LogError::IllegalState(format!(
                "Writer of segment version {} is closed",
                self.version()
            )));
        };

        let buf = record.serialize();
        out.write_all(&buf).map_err(|e| {
            warn!("Failed to write entry {} to segment file: {}", record.index, e);
            e
        })?;
        self.size.fetch_add(buf.len() as u64, Ordering::AcqRel);
        self.last_index.store(record.index, Ordering::Release);
        Ok(())
    }

    pub fn flush(&self) -> LogResult<()> {
        let mut writer = self.writer.lock();
        if let WriterState::Open(out) = &mut *writer {
            out.flush().map_err(|e| {
                warn!("Failed to flush segment file {:?}: {}", self.path, e);
                e
            })?;
            if self.ctx.sync_on_flush {
                out.get_ref().sync_data().map_err(|e| {
                    warn!("Failed to sync segment file {:?}: {}", self.path, e);
                    e
                })?;
            }
        }
        Ok(())
    }

    /// Permanently end writability. Idempotent.
    pub fn close_writer(&self) -> LogResult<()> {
        let mut writer = self.writer.lock();
        match std::mem::replace(&mut *writer, WriterState::Closed) {
            WriterState::Open(mut out) => {
                let flushed = out.flush();
                self.ref_count.decrease();
                flushed.map_err(|e| {
                    warn!("Failed to flush segment file {:?} on close: {}", self.path, e);
                    e
                })?;
            }
            WriterState::Unopened | WriterState::Closed => {}
        }
        Ok(())
    }

    /// Dispose the file if the writer is closed and no cursor holds it.
    pub fn try_close(&self) -> bool {
        let mut writer = self.writer.lock();
        if matches!(*writer, WriterState::Open(_)) {
            return false;
        }
        if !self.ref_count.try_dispose() {
            return false;
        }
        *writer = WriterState::Closed;
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.ref_count.is_disposed()
    }

    pub fn delete(&self) -> LogResult<()> {
        fs::remove_file(&self.path).map_err(|e| {
            error!("Failed to delete segment file {:?}: {}", self.path, e);
            e.into()
        })
    }

    /// Cursor over the records of this file starting at `from_index`.
    pub fn get_cursor(self: &Arc<Self>, from_index: LogIndex) -> LogResult<SegmentCursor> {
        if from_index <= self.header.prev_index {
            return Err(LogError::IllegalArgument(format!(
                "Index {} precedes segment version {} starting after {}",
                from_index,
                self.version(),
                self.header.prev_index
            )));
        }
        if !self.ref_count.increase() {
            return Err(LogError::Disposed {
                version: self.version(),
            });
        }

        let start = LogPosition {
            version: self.version(),
            index: self.header.prev_index + 1,
            byte_offset: SEGMENT_HEADER_SIZE,
        };
        let position = self
            .ctx
            .position_cache
            .lookup(self.version(), from_index, start);

        let reader = match self.ctx.reader_pool.acquire(self.version(), position.byte_offset) {
            Ok(reader) => reader,
            Err(e) => {
                self.ref_count.decrease();
                return Err(e);
            }
        };

        let mut cursor = SegmentCursor {
            segment: self.clone(),
            reader: Some(reader),
            next_index: position.index,
            current: None,
            exhausted: false,
            closed: false,
        };
        while cursor.next_index < from_index {
            if !cursor.next()? {
                break;
            }
        }
        cursor.current = None;
        Ok(cursor)
    }
}

impl std::fmt::Debug for SegmentFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentFile")
            .field("header", &self.header)
            .field("last_index", &self.last_index())
            .field("size", &self.size())
            .finish()
    }
}

/// Forward-only cursor over one segment file. Holds a reference on the file
/// until closed or dropped.
pub struct SegmentCursor {
    segment: Arc<SegmentFile>,
    reader: Option<Reader>,
    next_index: LogIndex,
    current: Option<EntryRecord>,
    exhausted: bool,
    closed: bool,
}

impl std::fmt::Debug for SegmentCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentCursor")
            .field("next_index", &self.next_index)
            .field("current", &self.current)
            .field("exhausted", &self.exhausted)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl SegmentCursor {
    /// Advance to the next record. Returns `false` at the end of the readable
    /// records; once exhausted, the cursor stays exhausted.
    ///
    /// A reader that fails is discarded instead of returned to the pool.
    pub fn next(&mut self) -> LogResult<bool> {
        self.current = None;
        if self.exhausted || self.closed {
            return Ok(false);
        }
        let Some(reader) = self.reader.as_mut() else {
            self.exhausted = true;
            return Ok(false);
        };

        match reader.read_record() {
            Ok(Some(record)) if record.index == self.next_index => {
                self.next_index += 1;
                self.current = Some(record);
                Ok(true)
            }
            Ok(Some(record)) => {
                let expected = self.next_index;
                self.discard_reader();
                Err(LogError::damaged(format!(
                    "Segment version {} holds entry {} where {} was expected",
                    self.segment.version(),
                    record.index,
                    expected
                )))
            }
            Ok(None) => {
                self.exhausted = true;
                Ok(false)
            }
            Err(e) => {
                self.discard_reader();
                Err(e)
            }
        }
    }

    pub fn current(&self) -> Option<&EntryRecord> {
        self.current.as_ref()
    }

    pub fn take_current(&mut self) -> Option<EntryRecord> {
        self.current.take()
    }

    pub fn segment(&self) -> &Arc<SegmentFile> {
        &self.segment
    }

    fn discard_reader(&mut self) {
        self.exhausted = true;
        if let Some(reader) = self.reader.take() {
            reader.close();
        }
    }

    /// Release the reader and the file reference. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.current = None;

        if let Some(reader) = self.reader.take() {
            if self.next_index > self.segment.header.prev_index + 1 {
                self.segment.ctx.position_cache.put(LogPosition {
                    version: self.segment.version(),
                    index: self.next_index,
                    byte_offset: reader.position(),
                });
            }
            self.segment.ctx.reader_pool.release(reader);
        }
        self.segment.ref_count.decrease();
    }
}

impl Drop for SegmentCursor {
    fn drop(&mut self) {
        self.close();
    }
}
