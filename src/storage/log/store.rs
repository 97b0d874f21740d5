use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    clock::{Clock, SystemClock},
    error::{LogError, LogResult},
    marshal::ContentMarshal,
    types::{LogIndex, NO_TERM, RaftLogEntry, Term},
};

use super::{
    cursor::{EntryCursor, RaftLogCursor},
    entry::EntryRecord,
    file_names::FileNames,
    position_cache::PositionCache,
    pruner::ReaderPoolPruner,
    pruning::{LogPruner, PruningStrategyConfig},
    reader::ReaderPool,
    recovery::RecoveryProtocol,
    segment::{SegmentContext, SegmentFile},
    segments::Segments,
    terms::Terms,
};

/// Default rotation threshold (250MB)
pub const DEFAULT_ROTATE_AT_SIZE: u64 = 250 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftLogOptions {
    /// Directory holding the segment files; created on start if missing
    pub dir: PathBuf,
    /// Tail size in bytes at which the next append starts a new file
    pub rotate_at_size: u64,
    /// Maximum number of idle readers kept open
    pub reader_pool_size: usize,
    /// Idle readers older than this are closed by the pool pruner
    pub reader_idle_timeout_ms: u64,
    /// Whether flushing also syncs file data to disk
    pub sync_on_flush: bool,
    /// Retention policy, e.g. "100 entries", "7 files", "1g size", "keep_all"
    pub pruning_strategy: String,
}

impl Default for RaftLogOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/raft-log"),
            rotate_at_size: DEFAULT_ROTATE_AT_SIZE,
            reader_pool_size: 8,
            reader_idle_timeout_ms: 60_000,
            sync_on_flush: true,
            pruning_strategy: "1g size".to_string(),
        }
    }
}

impl RaftLogOptions {
    pub fn with_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn reader_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.reader_idle_timeout_ms)
    }

    fn validate(&self) -> LogResult<PruningStrategyConfig> {
        if self.rotate_at_size == 0 {
            return Err(LogError::InvalidConfig(
                "rotate_at_size must be positive".to_string(),
            ));
        }
        if self.reader_pool_size == 0 {
            return Err(LogError::InvalidConfig(
                "reader_pool_size must be positive".to_string(),
            ));
        }
        self.pruning_strategy.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Recovering,
    Ready,
}

/// Live boundaries of a started log.
struct LogState {
    append_index: LogIndex,
    prev_index: LogIndex,
    prev_term: Term,
    terms: Terms,
    segments: Arc<Segments>,
}

impl LogState {
    fn tail(&self) -> LogResult<Arc<SegmentFile>> {
        self.segments
            .last()
            .ok_or_else(|| LogError::IllegalState("Raft log has no segment files".to_string()))
    }

    /// Flush and close the writer of the current tail ahead of a new file.
    fn seal_tail(&self) -> LogResult<()> {
        let tail = self.tail()?;
        tail.flush()?;
        tail.close_writer()
    }

    fn rotate(&mut self) -> LogResult<Arc<SegmentFile>> {
        self.seal_tail()?;
        let term = self.terms.get(self.append_index);
        let segment = self
            .segments
            .rotate(self.append_index, self.append_index, term)?;
        info!(
            "Rotated raft log to segment version {} after index {}",
            segment.version(),
            self.append_index
        );
        Ok(segment)
    }

    fn write_records(&mut self, records: &[EntryRecord], rotate_at_size: u64) -> LogResult<()> {
        let mut tail = self.tail()?;
        for record in records {
            let holds_entries = tail.last_index() > tail.header().prev_index;
            if holds_entries && tail.size() >= rotate_at_size {
                tail = self.rotate()?;
            }
            tail.write(record)?;
            self.terms.append(record.index, record.term)?;
            self.append_index = record.index;
        }
        tail.flush()
    }
}

/// Durable raft log stored as a sequence of segment files.
///
/// All mutations (`append`, `truncate`, `skip`, `prune`) take `&mut self`;
/// cursors own their file resources and can be moved to other threads.
pub struct SegmentedRaftLog<C> {
    options: RaftLogOptions,
    file_names: FileNames,
    marshal: Arc<dyn ContentMarshal<C>>,
    clock: Arc<dyn Clock>,
    pruner: LogPruner,
    lifecycle: LifecycleState,
    state: Option<LogState>,
    needs_recovery: bool,
}

impl<C> SegmentedRaftLog<C> {
    pub fn new<M>(options: RaftLogOptions, marshal: M) -> LogResult<Self>
    where
        M: ContentMarshal<C> + 'static,
    {
        Self::with_clock(options, marshal, Arc::new(SystemClock))
    }

    pub fn with_clock<M>(options: RaftLogOptions, marshal: M, clock: Arc<dyn Clock>) -> LogResult<Self>
    where
        M: ContentMarshal<C> + 'static,
    {
        let strategy = options.validate().map_err(|e| {
            warn!("Rejected raft log options: {}", e);
            e
        })?;
        Ok(Self {
            file_names: FileNames::new(&options.dir),
            options,
            marshal: Arc::new(marshal),
            clock,
            pruner: LogPruner::new(strategy.build()),
            lifecycle: LifecycleState::Stopped,
            state: None,
            needs_recovery: false,
        })
    }

    /// Recover the log from disk and make it ready for use.
    pub fn start(&mut self) -> LogResult<()> {
        if self.lifecycle == LifecycleState::Ready {
            debug!("Raft log in {:?} is already started", self.options.dir);
            return Ok(());
        }
        self.lifecycle = LifecycleState::Recovering;

        let recovered = fs::create_dir_all(&self.options.dir)
            .map_err(LogError::from)
            .and_then(|_| {
                let reader_pool = Arc::new(ReaderPool::new(
                    self.options.reader_pool_size,
                    Arc::new(self.file_names.clone()),
                    self.clock.clone(),
                ));
                let ctx = SegmentContext {
                    reader_pool: reader_pool.clone(),
                    position_cache: Arc::new(PositionCache::new()),
                    sync_on_flush: self.options.sync_on_flush,
                };
                RecoveryProtocol::new(self.file_names.clone(), ctx)
                    .run()
                    .inspect_err(|_| reader_pool.close())
            });

        match recovered {
            Ok(recovered) => {
                info!(
                    "Raft log in {:?} ready: prev_index {}, append_index {}, {} segment file(s)",
                    self.options.dir,
                    recovered.prev_index,
                    recovered.append_index,
                    recovered.segments.count()
                );
                self.state = Some(LogState {
                    append_index: recovered.append_index,
                    prev_index: recovered.prev_index,
                    prev_term: recovered.prev_term,
                    terms: recovered.terms,
                    segments: recovered.segments,
                });
                self.needs_recovery = false;
                self.lifecycle = LifecycleState::Ready;
                Ok(())
            }
            Err(e) => {
                error!("Failed to recover raft log in {:?}: {}", self.options.dir, e);
                self.lifecycle = LifecycleState::Stopped;
                Err(e)
            }
        }
    }

    /// Close every file. Open cursors keep their own files alive until they
    /// are closed.
    pub fn stop(&mut self) -> LogResult<()> {
        self.lifecycle = LifecycleState::Stopped;
        match self.state.take() {
            Some(state) => {
                info!(
                    "Stopping raft log in {:?} at append_index {}",
                    self.options.dir, state.append_index
                );
                state.segments.close()
            }
            None => Ok(()),
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    /// Whether a failed write requires a restart before further mutations.
    pub fn needs_recovery(&self) -> bool {
        self.needs_recovery
    }

    fn ready_state(&self) -> LogResult<&LogState> {
        match (&self.lifecycle, &self.state) {
            (LifecycleState::Ready, Some(state)) => Ok(state),
            _ => Err(LogError::NotReady),
        }
    }

    fn writable_state(&mut self) -> LogResult<&mut LogState> {
        if self.needs_recovery {
            return Err(LogError::NeedsRecovery);
        }
        match (&self.lifecycle, self.state.as_mut()) {
            (LifecycleState::Ready, Some(state)) => Ok(state),
            _ => Err(LogError::NotReady),
        }
    }

    /// Run a validated mutation. Any failure part way leaves disk and memory
    /// possibly out of step, so the log refuses further mutations.
    fn mutate<T>(&mut self, op: impl FnOnce(&mut LogState) -> LogResult<T>) -> LogResult<T> {
        let result = op(self.writable_state()?);
        if let Err(e) = &result {
            error!("Raft log mutation failed, recovery required: {}", e);
            self.needs_recovery = true;
        }
        result
    }

    /// Append `entries` after the current append index and flush them.
    /// Returns the new append index.
    pub fn append(&mut self, entries: &[RaftLogEntry<C>]) -> LogResult<LogIndex> {
        let marshal = self.marshal.clone();
        let state = self.writable_state()?;
        if entries.is_empty() {
            return Ok(state.append_index);
        }

        let mut latest = state.terms.latest();
        let mut index = state.append_index;
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            index += 1;
            if entry.term < latest {
                return Err(LogError::IllegalState(format!(
                    "Non-monotonic term {} for entry {} after term {}",
                    entry.term, index, latest
                )));
            }
            latest = entry.term;

            let mut payload = Vec::new();
            marshal.marshal(&entry.content, &mut payload)?;
            records.push(EntryRecord::new(index, entry.term, payload));
        }

        let rotate_at_size = self.options.rotate_at_size;
        self.mutate(|state| {
            state.write_records(&records, rotate_at_size)?;
            Ok(state.append_index)
        })
    }

    /// Discard every entry from `from_index` onwards.
    pub fn truncate(&mut self, from_index: LogIndex) -> LogResult<()> {
        let state = self.writable_state()?;
        if from_index > state.append_index {
            return Err(LogError::IllegalArgument(format!(
                "Cannot truncate at index {} when append index is {}",
                from_index, state.append_index
            )));
        }
        if from_index <= state.prev_index {
            return Err(LogError::IllegalArgument(format!(
                "Cannot truncate at index {} at or before prev index {}",
                from_index, state.prev_index
            )));
        }

        let new_append_index = from_index - 1;
        let new_term = match state.terms.get(new_append_index) {
            NO_TERM if new_append_index == state.prev_index => state.prev_term,
            term => term,
        };

        self.mutate(|state| {
            info!(
                "Truncating raft log from index {} (append_index {}), continuing at term {}",
                from_index, state.append_index, new_term
            );
            state.seal_tail()?;
            state
                .segments
                .truncate(state.append_index, new_append_index, new_term)?;
            state.terms.truncate(from_index)?;
            state.append_index = new_append_index;
            Ok(())
        })
    }

    /// Jump the log forward so that `index` becomes the last known entry, as
    /// when installing a snapshot. Returns the append index.
    pub fn skip(&mut self, index: LogIndex, term: Term) -> LogResult<LogIndex> {
        let state = self.writable_state()?;
        if index <= state.append_index {
            debug!(
                "Not skipping to index {}, append index is already {}",
                index, state.append_index
            );
            return Ok(state.append_index);
        }

        self.mutate(|state| {
            info!(
                "Skipping raft log from index {} (term {}) to index {} (term {})",
                state.append_index,
                state.terms.latest(),
                index,
                term
            );
            state.seal_tail()?;
            state.segments.skip(state.append_index, index, term)?;
            state.terms.skip(index, term);
            state.prev_index = index;
            state.prev_term = term;
            state.append_index = index;
            Ok(index)
        })
    }

    /// Discard whole segment files that hold nothing above `safe_index` and
    /// that the retention policy no longer needs. Returns the prev index.
    pub fn prune(&mut self, safe_index: LogIndex) -> LogResult<LogIndex> {
        let (summaries, append_index) = {
            let state = self.writable_state()?;
            (state.segments.summaries(), state.append_index)
        };
        let prune_index = self
            .pruner
            .index_to_prune_from(safe_index, &summaries)
            .min(append_index);

        let state = self.writable_state()?;
        if prune_index <= state.prev_index {
            return Ok(state.prev_index);
        }

        if let Some(oldest) = state.segments.prune(prune_index) {
            if oldest.prev_index > state.prev_index {
                state.prev_term = match state.terms.get(oldest.prev_index) {
                    NO_TERM => oldest.prev_term,
                    term => term,
                };
                state.prev_index = oldest.prev_index;
            }
            state.terms.prune(state.prev_index);
        }
        Ok(state.prev_index)
    }

    /// Term of the entry at `index`; `-1` when the log does not hold it.
    pub fn read_entry_term(&self, index: LogIndex) -> LogResult<Term> {
        let state = self.ready_state()?;
        if index > state.append_index || index < state.prev_index {
            return Ok(NO_TERM);
        }
        if index == state.prev_index {
            return Ok(state.prev_term);
        }

        let term = state.terms.get(index);
        if term != NO_TERM {
            return Ok(term);
        }

        let mut cursor = EntryCursor::open(state.segments.clone(), index)?;
        let term = if cursor.next()? {
            cursor
                .current()
                .filter(|record| record.index == index)
                .map_or(NO_TERM, |record| record.term)
        } else {
            NO_TERM
        };
        cursor.close();
        Ok(term)
    }

    /// Cursor over the entries from `from_index` on. Indices outside
    /// `(prev_index, append_index]` give an empty cursor. The file holding
    /// `from_index` is pinned on return and stays on disk until the cursor
    /// moves past it or is closed.
    pub fn get_entry_cursor(&self, from_index: LogIndex) -> LogResult<RaftLogCursor<C>> {
        let state = self.ready_state()?;
        if from_index > state.append_index || from_index <= state.prev_index {
            return Ok(RaftLogCursor::empty());
        }
        Ok(RaftLogCursor::new(
            EntryCursor::open(state.segments.clone(), from_index)?,
            self.marshal.clone(),
        ))
    }

    pub fn append_index(&self) -> LogResult<LogIndex> {
        Ok(self.ready_state()?.append_index)
    }

    pub fn prev_index(&self) -> LogResult<LogIndex> {
        Ok(self.ready_state()?.prev_index)
    }

    pub fn prev_term(&self) -> LogResult<Term> {
        Ok(self.ready_state()?.prev_term)
    }

    pub fn segment_count(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.segments.count())
    }

    /// Bytes held by segment files, including files awaiting pruning.
    pub fn disk_usage(&self) -> u64 {
        self.state.as_ref().map_or(0, |s| s.segments.disk_usage())
    }

    pub fn reader_pool(&self) -> Option<Arc<ReaderPool>> {
        self.state.as_ref().map(|s| s.segments.reader_pool().clone())
    }

    /// Start a background task closing readers idle for longer than the
    /// configured timeout. Must be called inside a tokio runtime.
    pub fn spawn_reader_pruner(&self, interval: Duration) -> LogResult<ReaderPoolPruner> {
        let pool = self.reader_pool().ok_or(LogError::NotReady)?;
        Ok(ReaderPoolPruner::spawn(
            pool,
            self.options.reader_idle_timeout(),
            interval,
        ))
    }
}

impl<C> Drop for SegmentedRaftLog<C> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop raft log in {:?}: {}", self.options.dir, e);
        }
    }
}
