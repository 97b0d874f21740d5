use thiserror::Error;

use crate::types::LogIndex;

pub type LogResult<T> = Result<T, LogError>;

/// Errors raised by the segmented raft log.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// On-disk structure contradicts the log invariants. Fatal to startup.
    #[error("Damaged log storage: {0}")]
    DamagedStorage(String),

    #[error("Segment file version {version} has been disposed")]
    Disposed { version: u64 },

    /// Out-of-order use of the log. Raised before any state is touched.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Checksum mismatch for entry {index} at offset {offset}")]
    ChecksumMismatch { index: LogIndex, offset: u64 },

    #[error("Marshal error: {0}")]
    Marshal(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Raft log is not started")]
    NotReady,

    #[error("Raft log needs recovery after a failed write")]
    NeedsRecovery,
}

impl LogError {
    pub(crate) fn damaged(msg: impl Into<String>) -> Self {
        LogError::DamagedStorage(msg.into())
    }

    /// Whether the error reflects a torn or corrupt tail rather than a
    /// structural problem.
    pub fn is_torn_record(&self) -> bool {
        matches!(self, LogError::ChecksumMismatch { .. })
    }
}
