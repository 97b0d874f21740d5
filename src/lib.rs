//! Segmented, crash-safe raft log.
//!
//! Entries are appended to a sequence of segment files that are rotated by
//! size, truncated and skipped by starting new files, and pruned as whole
//! files once no reader needs them.

pub mod clock;
pub mod error;
pub mod marshal;
pub mod storage;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{LogError, LogResult};
pub use marshal::{BincodeMarshal, BytesMarshal, ContentMarshal};
pub use storage::log::{LifecycleState, RaftLogCursor, RaftLogOptions, SegmentedRaftLog};
pub use types::{LogIndex, NO_INDEX, NO_TERM, RaftLogEntry, Term};
