// test_log.rs
#![allow(dead_code)]
use segmented_raft_log::{
    BincodeMarshal, LogIndex, RaftLogEntry, RaftLogOptions, SegmentedRaftLog, Term,
};
use std::path::Path;
use std::sync::Once;

pub type TestLog = SegmentedRaftLog<String>;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

pub fn options(dir: &Path) -> RaftLogOptions {
    RaftLogOptions {
        sync_on_flush: false,
        pruning_strategy: "keep_all".to_string(),
        ..RaftLogOptions::default().with_dir(dir)
    }
}

pub fn open_log(options: RaftLogOptions) -> TestLog {
    init_tracing();
    let mut log = SegmentedRaftLog::new(options, BincodeMarshal::new()).unwrap();
    log.start().unwrap();
    log
}

pub fn entry(term: Term, index: LogIndex) -> RaftLogEntry<String> {
    RaftLogEntry::new(term, format!("command-{}", index))
}

/// Append one entry per term in `terms`, each in its own call.
pub fn append_terms(log: &mut TestLog, terms: &[Term]) {
    for &term in terms {
        let index = log.append_index().unwrap() + 1;
        assert_eq!(log.append(&[entry(term, index)]).unwrap(), index);
    }
}

pub fn read_all(log: &TestLog, from: LogIndex) -> Vec<(LogIndex, Term, String)> {
    let mut cursor = log.get_entry_cursor(from).unwrap();
    let mut entries = Vec::new();
    while cursor.next().unwrap() {
        let entry = cursor.entry().unwrap();
        entries.push((cursor.index(), entry.term, entry.content.clone()));
    }
    cursor.close();
    entries
}

pub fn segment_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("raft.log."))
        .collect();
    names.sort();
    names
}
