use heapless::HistoryBuffer;
use parking_lot::Mutex;

use crate::types::LogIndex;

pub const POSITION_CACHE_SIZE: usize = 8;

/// Byte offset at which the record for `index` starts in segment `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPosition {
    pub version: u64,
    pub index: LogIndex,
    pub byte_offset: u64,
}

/// Small ring of recently visited record positions, newest overwriting
/// oldest. A hit only ever narrows a forward scan, it never ends one.
pub struct PositionCache {
    ring: Mutex<HistoryBuffer<LogPosition, POSITION_CACHE_SIZE>>,
}

impl PositionCache {
    pub fn new() -> Self {
        Self {
            ring: Mutex::new(HistoryBuffer::new()),
        }
    }

    pub fn put(&self, position: LogPosition) {
        self.ring.lock().write(position);
    }

    /// Best cached position in `version` at or before `index`. Falls back to
    /// `start` (the first record of the file) on a miss.
    pub fn lookup(&self, version: u64, index: LogIndex, start: LogPosition) -> LogPosition {
        let ring = self.ring.lock();
        ring.as_slice()
            .iter()
            .filter(|p| p.version == version && p.index <= index && p.index > start.index)
            .max_by_key(|p| p.index)
            .copied()
            .unwrap_or(start)
    }

    pub fn clear(&self) {
        self.ring.lock().clear();
    }
}

impl Default for PositionCache {
    fn default() -> Self {
        Self::new()
    }
}
