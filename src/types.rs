/// Position of an entry in the logical log. `-1` means "no entry".
pub type LogIndex = i64;

/// Raft term. `-1` means "unknown".
pub type Term = i64;

pub const NO_INDEX: LogIndex = -1;
pub const NO_TERM: Term = -1;

/// A single consensus log entry: the term it was created in plus the
/// application content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftLogEntry<C> {
    pub term: Term,
    pub content: C,
}

impl<C> RaftLogEntry<C> {
    pub fn new(term: Term, content: C) -> Self {
        Self { term, content }
    }
}
