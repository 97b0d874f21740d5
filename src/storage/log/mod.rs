//! Segmented log storage for raft.
//!
//! The log is a sequence of segment files, each starting with a header that
//! links it to the log before it. Truncation and skipping never rewrite a
//! file: they start a new one, and the range map routes every index to the
//! newest file that owns it. Old files are deleted by pruning once idle.
//!
//! # Module Structure
//!
//! - `entry`, `header`: on-disk record and header formats
//! - `segment`: one file, its writer and its cursors
//! - `segments`: the live file collection with rotation and pruning
//! - `reader`: pooled read handles shared by all files
//! - `recovery`: rebuilds the log state from disk on start
//! - `pruning`, `pruner`: retention policies and the idle reader sweeper
//! - `store`: the `SegmentedRaftLog` facade

mod cursor;
mod entry;
mod file_names;
mod header;
mod position_cache;
mod pruner;
mod pruning;
mod range_map;
mod reader;
mod recovery;
mod ref_count;
mod segment;
mod segments;
mod store;
mod terms;

#[cfg(test)]
mod tests;

pub use cursor::{EntryCursor, RaftLogCursor};
pub use entry::{EntryRecord, RECORD_HEADER_SIZE};
pub use file_names::{BASE_FILE_NAME, FileNames};
pub use header::{SEGMENT_HEADER_SIZE, SegmentHeader};
pub use position_cache::{LogPosition, POSITION_CACHE_SIZE, PositionCache};
pub use pruner::ReaderPoolPruner;
pub use pruning::{
    ByteBasedLogPruningStrategy, EntryBasedLogPruningStrategy, LogPruner, LogPruningStrategy,
    NoPruningStrategy, PruningStrategyConfig, SizeBasedLogPruningStrategy,
};
pub use range_map::{RangeMap, ValueRange};
pub use reader::{ChannelOpener, ReadChannel, Reader, ReaderPool};
pub use recovery::{RecoveryProtocol, RecoveryState};
pub use ref_count::ReferenceCounter;
pub use segment::{SegmentContext, SegmentCursor, SegmentFile};
pub use segments::{SegmentSummary, Segments};
pub use store::{DEFAULT_ROTATE_AT_SIZE, LifecycleState, RaftLogOptions, SegmentedRaftLog};
pub use terms::Terms;
