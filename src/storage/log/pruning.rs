//! Retention policies.
//!
//! A strategy looks at the current segment files and names the highest index
//! that may be discarded (`-1` keeps everything). Strategies work at file
//! granularity; the log never removes part of a file.

use std::{fmt, str::FromStr};

use crate::{
    error::{LogError, LogResult},
    types::{LogIndex, NO_INDEX},
};

use super::segments::SegmentSummary;

pub trait LogPruningStrategy: Send + Sync {
    /// Highest index that may be pruned given `segments` (oldest first).
    fn index_to_keep(&self, segments: &[SegmentSummary]) -> LogIndex;
}

/// Keep at least the newest `keep_entries` entries.
#[derive(Debug, Clone, Copy)]
pub struct EntryBasedLogPruningStrategy {
    keep_entries: u64,
}

impl EntryBasedLogPruningStrategy {
    pub fn new(keep_entries: u64) -> Self {
        Self { keep_entries }
    }
}

impl LogPruningStrategy for EntryBasedLogPruningStrategy {
    fn index_to_keep(&self, segments: &[SegmentSummary]) -> LogIndex {
        let mut accumulated = 0u64;
        for segment in segments.iter().rev() {
            accumulated += segment.live_entries;
            if accumulated >= self.keep_entries {
                return segment.header.prev_index;
            }
        }
        NO_INDEX
    }
}

/// Keep the newest `keep_files` segment files.
#[derive(Debug, Clone, Copy)]
pub struct SizeBasedLogPruningStrategy {
    keep_files: u64,
}

impl SizeBasedLogPruningStrategy {
    pub fn new(keep_files: u64) -> Self {
        Self { keep_files }
    }
}

impl LogPruningStrategy for SizeBasedLogPruningStrategy {
    fn index_to_keep(&self, segments: &[SegmentSummary]) -> LogIndex {
        if self.keep_files == 0 || segments.len() as u64 <= self.keep_files {
            return NO_INDEX;
        }
        let oldest_kept = segments.len() - self.keep_files as usize;
        segments[oldest_kept].header.prev_index
    }
}

/// Keep the newest files that together hold at least `keep_bytes` bytes.
#[derive(Debug, Clone, Copy)]
pub struct ByteBasedLogPruningStrategy {
    keep_bytes: u64,
}

impl ByteBasedLogPruningStrategy {
    pub fn new(keep_bytes: u64) -> Self {
        Self { keep_bytes }
    }
}

impl LogPruningStrategy for ByteBasedLogPruningStrategy {
    fn index_to_keep(&self, segments: &[SegmentSummary]) -> LogIndex {
        let mut accumulated = 0u64;
        for segment in segments.iter().rev() {
            accumulated += segment.size;
            if accumulated >= self.keep_bytes {
                return segment.header.prev_index;
            }
        }
        NO_INDEX
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPruningStrategy;

impl LogPruningStrategy for NoPruningStrategy {
    fn index_to_keep(&self, _segments: &[SegmentSummary]) -> LogIndex {
        NO_INDEX
    }
}

/// Parsed form of a retention policy string such as `"100 entries"`,
/// `"7 files"`, `"512m size"` or `"keep_all"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruningStrategyConfig {
    KeepAll,
    Entries(u64),
    Files(u64),
    Size(u64),
}

impl PruningStrategyConfig {
    pub fn build(&self) -> Box<dyn LogPruningStrategy> {
        match *self {
            Self::KeepAll => Box::new(NoPruningStrategy),
            Self::Entries(n) => Box::new(EntryBasedLogPruningStrategy::new(n)),
            Self::Files(n) => Box::new(SizeBasedLogPruningStrategy::new(n)),
            Self::Size(bytes) => Box::new(ByteBasedLogPruningStrategy::new(bytes)),
        }
    }
}

impl FromStr for PruningStrategyConfig {
    type Err = LogError;

    fn from_str(s: &str) -> LogResult<Self> {
        let policy = s.trim().to_ascii_lowercase();
        if policy == "keep_all" || policy == "true" {
            return Ok(Self::KeepAll);
        }

        let invalid = || LogError::InvalidConfig(format!("Invalid pruning policy '{}'", s));
        let mut parts = policy.split_whitespace();
        let (Some(amount), Some(kind), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };

        match kind {
            "entries" | "txs" => amount.parse().map(Self::Entries).map_err(|_| invalid()),
            "files" => amount.parse().map(Self::Files).map_err(|_| invalid()),
            "size" => parse_bytes(amount).map(Self::Size).ok_or_else(invalid),
            "hours" | "days" => Err(LogError::InvalidConfig(format!(
                "Time based pruning is not supported: '{}'",
                s
            ))),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for PruningStrategyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepAll => write!(f, "keep_all"),
            Self::Entries(n) => write!(f, "{} entries", n),
            Self::Files(n) => write!(f, "{} files", n),
            Self::Size(bytes) => write!(f, "{} size", bytes),
        }
    }
}

fn parse_bytes(amount: &str) -> Option<u64> {
    let (digits, multiplier) = match amount.as_bytes().last()? {
        b'k' => (&amount[..amount.len() - 1], 1u64 << 10),
        b'm' => (&amount[..amount.len() - 1], 1 << 20),
        b'g' => (&amount[..amount.len() - 1], 1 << 30),
        _ => (amount, 1),
    };
    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}

/// Combines the caller's safe index with the configured strategy.
pub struct LogPruner {
    strategy: Box<dyn LogPruningStrategy>,
}

impl LogPruner {
    pub fn new(strategy: Box<dyn LogPruningStrategy>) -> Self {
        Self { strategy }
    }

    /// Highest index that may be pruned: never beyond what the caller deems
    /// safe nor beyond what the strategy allows.
    pub fn index_to_prune_from(&self, safe_index: LogIndex, segments: &[SegmentSummary]) -> LogIndex {
        safe_index.min(self.strategy.index_to_keep(segments))
    }
}
