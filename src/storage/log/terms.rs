//! Run-length index from log index to term.
//!
//! `indexes[i]` is the first log index of run `i`, `terms[i]` its term. Both
//! arrays only grow when the term changes, so memory follows the number of
//! elections rather than the number of entries.

use crate::{
    error::{LogError, LogResult},
    types::{LogIndex, NO_TERM, Term},
};

#[derive(Debug, Clone)]
pub struct Terms {
    indexes: Vec<LogIndex>,
    terms: Vec<Term>,
    /// Lowest resolvable index, inclusive.
    min: LogIndex,
    /// Highest resolvable index, inclusive.
    max: LogIndex,
}

impl Terms {
    pub fn new(prev_index: LogIndex, prev_term: Term) -> Self {
        let mut terms = Self {
            indexes: Vec::new(),
            terms: Vec::new(),
            min: prev_index,
            max: prev_index,
        };
        terms.skip(prev_index, prev_term);
        terms
    }

    pub fn append(&mut self, index: LogIndex, term: Term) -> LogResult<()> {
        if index != self.max + 1 {
            return Err(LogError::IllegalState(format!(
                "Non-monotonic index {} must follow {}",
                index, self.max
            )));
        }
        if let Some(&latest) = self.terms.last() {
            if term < latest {
                return Err(LogError::IllegalState(format!(
                    "Non-monotonic term {} for entry {} after term {}",
                    term, index, latest
                )));
            }
        }

        self.max = index;
        if self.terms.last() != Some(&term) {
            self.indexes.push(index);
            self.terms.push(term);
        }
        Ok(())
    }

    /// Term at `index`, or `-1` if the index is outside the known range.
    pub fn get(&self, index: LogIndex) -> Term {
        if index < self.min || index > self.max {
            return NO_TERM;
        }
        let runs = self.indexes.partition_point(|&start| start <= index);
        if runs == 0 {
            return NO_TERM;
        }
        self.terms[runs - 1]
    }

    /// Forget everything at and after `from_index`, which may be as low as
    /// the origin passed to `new`.
    pub fn truncate(&mut self, from_index: LogIndex) -> LogResult<()> {
        if from_index < self.min {
            return Err(LogError::IllegalState(format!(
                "Cannot truncate from index {} below the lowest known index {}",
                from_index, self.min
            )));
        }

        self.max = from_index - 1;
        let keep = self.indexes.partition_point(|&start| start < from_index);
        self.indexes.truncate(keep);
        self.terms.truncate(keep);
        Ok(())
    }

    /// Replace all history with a single run starting at `index`.
    pub fn skip(&mut self, index: LogIndex, term: Term) {
        self.indexes.clear();
        self.terms.clear();
        self.indexes.push(index);
        self.terms.push(term);
        self.min = index;
        self.max = index;
    }

    /// Drop history below `upto_index`; afterwards `upto_index` is the lowest
    /// resolvable index.
    ///
    /// An `upto_index` beyond the latest index is capped at the latest index,
    /// so the last known term always stays resolvable.
    pub fn prune(&mut self, upto_index: LogIndex) {
        let upto_index = upto_index.min(self.max);
        if upto_index <= self.min {
            return;
        }
        self.min = upto_index;

        let runs = self.indexes.partition_point(|&start| start <= upto_index);
        if runs == 0 {
            return;
        }
        self.indexes.drain(..runs - 1);
        self.terms.drain(..runs - 1);
        self.indexes[0] = upto_index;
    }

    pub fn latest(&self) -> Term {
        self.terms.last().copied().unwrap_or(NO_TERM)
    }

    pub fn latest_index(&self) -> LogIndex {
        self.max
    }

    pub fn lowest_index(&self) -> LogIndex {
        self.min
    }

    /// Number of stored runs.
    pub fn run_count(&self) -> usize {
        self.indexes.len()
    }
}
