//! Unit tests for the log storage module.

#[cfg(test)]
mod support {
    use std::{path::Path, sync::Arc};

    use crate::clock::ManualClock;
    use crate::storage::log::{
        entry::EntryRecord,
        file_names::FileNames,
        position_cache::PositionCache,
        reader::ReaderPool,
        segment::{SegmentContext, SegmentFile},
        segments::Segments,
    };
    use crate::types::{LogIndex, Term};

    pub fn context(dir: &Path) -> (FileNames, SegmentContext) {
        let names = FileNames::new(dir);
        let reader_pool = Arc::new(ReaderPool::new(
            8,
            Arc::new(names.clone()),
            Arc::new(ManualClock::new(0)),
        ));
        let ctx = SegmentContext {
            reader_pool,
            position_cache: Arc::new(PositionCache::new()),
            sync_on_flush: false,
        };
        (names, ctx)
    }

    pub fn empty_segments(dir: &Path) -> Segments {
        let (names, ctx) = context(dir);
        Segments::new(names, ctx, Vec::new(), 0)
    }

    pub fn payload(index: LogIndex) -> Vec<u8> {
        format!("entry-{:04}", index).into_bytes()
    }

    /// Write entries `from..=to` with `term` and flush.
    pub fn fill(segment: &SegmentFile, from: LogIndex, to: LogIndex, term: Term) {
        for index in from..=to {
            segment
                .write(&EntryRecord::new(index, term, payload(index)))
                .unwrap();
        }
        segment.flush().unwrap();
    }
}

#[cfg(test)]
mod segment_tests {
    use std::{
        fs::OpenOptions,
        io::{Seek, SeekFrom, Write},
        sync::Arc,
    };

    use tempfile::TempDir;

    use super::support::*;
    use crate::error::LogError;
    use crate::storage::log::{
        entry::RECORD_HEADER_SIZE,
        header::{SEGMENT_HEADER_SIZE, SegmentHeader},
        position_cache::LogPosition,
        segment::SegmentFile,
    };

    fn new_segment(temp_dir: &TempDir, prev_index: i64) -> Arc<SegmentFile> {
        let (names, ctx) = context(temp_dir.path());
        let header = SegmentHeader::new(prev_index, 0, prev_index, 1);
        Arc::new(SegmentFile::create(names.path_for_version(0), header, ctx).unwrap())
    }

    fn record_len() -> u64 {
        RECORD_HEADER_SIZE + payload(0).len() as u64
    }

    #[test]
    fn test_create_writes_header() {
        let temp_dir = TempDir::new().unwrap();
        let segment = new_segment(&temp_dir, 9);

        assert_eq!(segment.size(), SEGMENT_HEADER_SIZE);
        assert_eq!(segment.last_index(), 9);
        let on_disk = SegmentHeader::read_from(segment.path()).unwrap();
        assert_eq!(on_disk, Some(*segment.header()));
    }

    #[test]
    fn test_write_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let segment = new_segment(&temp_dir, -1);
        fill(&segment, 0, 9, 1);

        assert_eq!(segment.last_index(), 9);
        assert_eq!(segment.size(), SEGMENT_HEADER_SIZE + 10 * record_len());

        let mut cursor = segment.get_cursor(0).unwrap();
        for expected in 0..10 {
            assert!(cursor.next().unwrap());
            let record = cursor.current().unwrap();
            assert_eq!(record.index, expected);
            assert_eq!(record.payload, payload(expected));
        }
        assert!(!cursor.next().unwrap());
        assert!(!cursor.next().unwrap());
    }

    #[test]
    fn test_cursor_from_middle() {
        let temp_dir = TempDir::new().unwrap();
        let segment = new_segment(&temp_dir, 4);
        fill(&segment, 5, 14, 2);

        let mut cursor = segment.get_cursor(11).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.current().unwrap().index, 11);
    }

    #[test]
    fn test_cursor_before_start_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let segment = new_segment(&temp_dir, 4);
        let err = segment.get_cursor(4).unwrap_err();
        assert!(matches!(err, LogError::IllegalArgument(_)));
    }

    #[test]
    fn test_closed_cursor_caches_position() {
        let temp_dir = TempDir::new().unwrap();
        let (names, ctx) = context(temp_dir.path());
        let cache = ctx.position_cache.clone();
        let header = SegmentHeader::new(-1, 0, -1, 1);
        let segment = Arc::new(SegmentFile::create(names.path_for_version(0), header, ctx).unwrap());
        fill(&segment, 0, 9, 1);

        let mut cursor = segment.get_cursor(0).unwrap();
        for _ in 0..3 {
            assert!(cursor.next().unwrap());
        }
        cursor.close();

        let start = LogPosition {
            version: 0,
            index: 0,
            byte_offset: SEGMENT_HEADER_SIZE,
        };
        let cached = cache.lookup(0, 5, start);
        assert_eq!(cached.index, 3);
        assert_eq!(cached.byte_offset, SEGMENT_HEADER_SIZE + 3 * record_len());

        // a later cursor starting past the cached point still lands correctly
        let mut cursor = segment.get_cursor(5).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.current().unwrap().index, 5);
    }

    #[test]
    fn test_closed_cursor_returns_reader_to_pool() {
        let temp_dir = TempDir::new().unwrap();
        let (names, ctx) = context(temp_dir.path());
        let pool = ctx.reader_pool.clone();
        let header = SegmentHeader::new(-1, 0, -1, 1);
        let segment = Arc::new(SegmentFile::create(names.path_for_version(0), header, ctx).unwrap());
        fill(&segment, 0, 2, 1);

        let mut cursor = segment.get_cursor(0).unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(pool.pooled_count(), 0);
        cursor.close();
        cursor.close();
        assert_eq!(pool.pooled_count(), 1);

        drop(segment.get_cursor(1).unwrap());
        assert_eq!(pool.pooled_count(), 1);
    }

    #[test]
    fn test_corrupt_record_discards_reader() {
        let temp_dir = TempDir::new().unwrap();
        let (names, ctx) = context(temp_dir.path());
        let pool = ctx.reader_pool.clone();
        let header = SegmentHeader::new(-1, 0, -1, 1);
        let segment = Arc::new(SegmentFile::create(names.path_for_version(0), header, ctx).unwrap());
        fill(&segment, 0, 2, 1);

        // flip the last payload byte of entry 1
        let mut file = OpenOptions::new().write(true).open(segment.path()).unwrap();
        file.seek(SeekFrom::Start(SEGMENT_HEADER_SIZE + 2 * record_len() - 1))
            .unwrap();
        file.write_all(b"X").unwrap();
        file.sync_all().unwrap();

        let mut cursor = segment.get_cursor(0).unwrap();
        assert!(cursor.next().unwrap());
        let err = cursor.next().unwrap_err();
        assert!(err.is_torn_record());
        assert!(!cursor.next().unwrap());
        cursor.close();
        assert_eq!(pool.pooled_count(), 0);
    }

    #[test]
    fn test_try_close_waits_for_writer_and_cursors() {
        let temp_dir = TempDir::new().unwrap();
        let segment = new_segment(&temp_dir, -1);
        fill(&segment, 0, 2, 1);

        assert!(!segment.try_close());
        segment.close_writer().unwrap();
        segment.close_writer().unwrap();

        let mut cursor = segment.get_cursor(0).unwrap();
        assert!(!segment.try_close());
        cursor.close();

        assert!(segment.try_close());
        assert!(segment.is_disposed());
        assert!(matches!(
            segment.get_cursor(0).unwrap_err(),
            LogError::Disposed { version: 0 }
        ));
    }

    #[test]
    fn test_write_after_close_writer_fails() {
        let temp_dir = TempDir::new().unwrap();
        let segment = new_segment(&temp_dir, -1);
        segment.close_writer().unwrap();
        let err = segment
            .write(&crate::storage::log::entry::EntryRecord::new(0, 1, Vec::new()))
            .unwrap_err();
        assert!(matches!(err, LogError::IllegalState(_)));
    }

    #[test]
    fn test_reopened_segment_appends_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let (names, ctx) = context(temp_dir.path());
        let header = SegmentHeader::new(-1, 0, -1, 1);
        {
            let segment = SegmentFile::create(names.path_for_version(0), header, ctx.clone()).unwrap();
            fill(&segment, 0, 1, 1);
            segment.close_writer().unwrap();
        }

        let size = SEGMENT_HEADER_SIZE + 2 * record_len();
        let segment = Arc::new(SegmentFile::open(
            names.path_for_version(0),
            header,
            1,
            size,
            ctx,
        ));
        fill(&segment, 2, 3, 1);
        assert_eq!(segment.size(), SEGMENT_HEADER_SIZE + 4 * record_len());

        let mut cursor = segment.get_cursor(0).unwrap();
        let mut seen = Vec::new();
        while cursor.next().unwrap() {
            seen.push(cursor.current().unwrap().index);
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}

#[cfg(test)]
mod segments_tests {
    use tempfile::TempDir;

    use super::support::*;
    use crate::error::LogError;

    #[test]
    fn test_continuity_checks() {
        let temp_dir = TempDir::new().unwrap();
        let segments = empty_segments(temp_dir.path());

        assert!(matches!(
            segments.rotate(5, 4, 1).unwrap_err(),
            LogError::IllegalArgument(_)
        ));
        assert!(matches!(
            segments.truncate(4, 5, 1).unwrap_err(),
            LogError::IllegalArgument(_)
        ));
        assert!(matches!(
            segments.skip(5, 4, 1).unwrap_err(),
            LogError::IllegalArgument(_)
        ));
        assert_eq!(segments.count(), 0);
    }

    #[test]
    fn test_versions_increase() {
        let temp_dir = TempDir::new().unwrap();
        let segments = empty_segments(temp_dir.path());

        let first = segments.rotate(-1, -1, -1).unwrap();
        let second = segments.rotate(-1, -1, -1).unwrap();
        assert_eq!((first.version(), second.version()), (0, 1));
        assert!(temp_dir.path().join("raft.log.0").exists());
        assert!(temp_dir.path().join("raft.log.1").exists());
        assert_eq!(segments.last().unwrap().version(), 1);
    }

    #[test]
    fn test_routing_after_truncate() {
        let temp_dir = TempDir::new().unwrap();
        let segments = empty_segments(temp_dir.path());

        let first = segments.rotate(-1, -1, -1).unwrap();
        fill(&first, 0, 9, 1);
        first.close_writer().unwrap();
        let second = segments.rotate(9, 9, 1).unwrap();
        fill(&second, 10, 19, 1);
        second.close_writer().unwrap();
        // discard 15..=19
        let third = segments.truncate(19, 14, 1).unwrap();

        let range = segments.get_for_index(3);
        assert_eq!(range.value.unwrap().version(), first.version());
        assert_eq!(range.limit, Some(10));

        let range = segments.get_for_index(12);
        assert_eq!(range.value.unwrap().version(), second.version());
        assert_eq!(range.limit, Some(15));

        let range = segments.get_for_index(15);
        assert_eq!(range.value.unwrap().version(), third.version());
        assert_eq!(range.limit, None);

        assert!(segments.get_for_index(-1).value.is_none());
    }

    #[test]
    fn test_summaries_count_live_entries() {
        let temp_dir = TempDir::new().unwrap();
        let segments = empty_segments(temp_dir.path());

        let first = segments.rotate(-1, -1, -1).unwrap();
        fill(&first, 0, 9, 1);
        first.close_writer().unwrap();
        let second = segments.truncate(9, 6, 1).unwrap();
        fill(&second, 7, 8, 2);

        let live: Vec<_> = segments.summaries().iter().map(|s| s.live_entries).collect();
        assert_eq!(live, vec![7, 2]);
    }

    #[test]
    fn test_prune_keeps_tail() {
        let temp_dir = TempDir::new().unwrap();
        let segments = empty_segments(temp_dir.path());

        let first = segments.rotate(-1, -1, -1).unwrap();
        fill(&first, 0, 4, 1);
        first.close_writer().unwrap();
        let tail = segments.rotate(4, 4, 1).unwrap();
        fill(&tail, 5, 9, 1);

        let oldest = segments.prune(100).unwrap();
        assert_eq!(oldest.prev_index, 4);
        assert_eq!(segments.count(), 1);
        assert!(!first.path().exists());
        assert!(tail.path().exists());

        assert!(segments.prune(100).is_none());
        assert_eq!(segments.count(), 1);
    }

    #[test]
    fn test_prune_only_whole_files() {
        let temp_dir = TempDir::new().unwrap();
        let segments = empty_segments(temp_dir.path());

        let first = segments.rotate(-1, -1, -1).unwrap();
        fill(&first, 0, 4, 1);
        first.close_writer().unwrap();
        let tail = segments.rotate(4, 4, 1).unwrap();
        fill(&tail, 5, 9, 1);

        assert!(segments.prune(3).is_none());
        assert_eq!(segments.count(), 2);
        assert!(segments.prune(4).is_some());
        assert_eq!(segments.count(), 1);
    }

    #[test]
    fn test_prune_stops_at_busy_file() {
        let temp_dir = TempDir::new().unwrap();
        let segments = empty_segments(temp_dir.path());

        let mut files = Vec::new();
        let mut prev = -1;
        for _ in 0..4 {
            let segment = segments.rotate(prev, prev, 1).unwrap();
            fill(&segment, prev + 1, prev + 5, 1);
            segment.close_writer().unwrap();
            prev += 5;
            files.push(segment);
        }

        // a reader on the second file blocks it and everything after it
        let mut cursor = files[1].get_cursor(7).unwrap();
        let oldest = segments.prune(100).unwrap();
        assert_eq!(oldest.version, files[1].version());
        assert_eq!(segments.count(), 3);
        assert!(!files[0].path().exists());
        assert!(files[2].path().exists());

        // the held file still reads fine
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.current().unwrap().index, 7);
        cursor.close();

        let oldest = segments.prune(100).unwrap();
        assert_eq!(oldest.version, files[3].version());
        assert_eq!(segments.count(), 1);
    }

    #[test]
    fn test_prune_drops_superseded_files() {
        let temp_dir = TempDir::new().unwrap();
        let segments = empty_segments(temp_dir.path());

        let first = segments.rotate(-1, -1, -1).unwrap();
        fill(&first, 0, 9, 1);
        first.close_writer().unwrap();
        let second = segments.rotate(9, 9, 1).unwrap();
        fill(&second, 10, 14, 1);
        second.close_writer().unwrap();
        // entries 8..=14 are replaced by the third file
        let third = segments.truncate(14, 7, 1).unwrap();
        fill(&third, 8, 12, 2);

        let oldest = segments.prune(7).unwrap();
        assert_eq!(oldest.prev_index, 7);
        assert_eq!(segments.count(), 1);
        assert_eq!(segments.get_for_index(8).value.unwrap().version(), third.version());
        assert!(segments.get_for_index(7).value.is_none());
    }

    #[test]
    fn test_disk_usage_and_close() {
        let temp_dir = TempDir::new().unwrap();
        let segments = empty_segments(temp_dir.path());

        let first = segments.rotate(-1, -1, -1).unwrap();
        fill(&first, 0, 4, 1);
        let expected: u64 = std::fs::metadata(first.path()).unwrap().len();
        assert_eq!(segments.disk_usage(), expected);

        segments.close().unwrap();
        assert!(first.is_disposed());
        assert_eq!(segments.reader_pool().pooled_count(), 0);
    }
}

#[cfg(test)]
mod recovery_tests {
    use std::fs;

    use tempfile::TempDir;

    use super::support::*;
    use crate::error::LogError;
    use crate::storage::log::{
        header::{SEGMENT_HEADER_SIZE, SegmentHeader},
        recovery::{RecoveryProtocol, RecoveryState},
        segments::Segments,
    };

    fn recover(temp_dir: &TempDir) -> Result<RecoveryState, LogError> {
        let (names, ctx) = context(temp_dir.path());
        RecoveryProtocol::new(names, ctx).run()
    }

    fn assert_damaged(temp_dir: &TempDir) {
        match recover(temp_dir) {
            Err(LogError::DamagedStorage(_)) => {}
            Err(other) => panic!("expected damaged storage, got {other}"),
            Ok(_) => panic!("expected damaged storage, recovery succeeded"),
        }
    }

    /// Files 0..=2 holding 0..=4 (term 1), 5..=9 (term 2), 10..=14 (term 3).
    fn three_files(temp_dir: &TempDir) -> Segments {
        let segments = empty_segments(temp_dir.path());
        let mut prev = -1;
        for term in 1..=3 {
            let segment = segments.rotate(prev, prev, term - 1).unwrap();
            fill(&segment, prev + 1, prev + 5, term);
            segment.close_writer().unwrap();
            prev += 5;
        }
        segments
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let state = recover(&temp_dir).unwrap();

        assert_eq!(state.append_index, -1);
        assert_eq!(state.prev_index, -1);
        assert_eq!(state.prev_term, -1);
        assert_eq!(state.segments.count(), 1);
        let header = SegmentHeader::read_from(&temp_dir.path().join("raft.log.0")).unwrap();
        assert_eq!(header, Some(SegmentHeader::new(-1, 0, -1, -1)));
    }

    #[test]
    fn test_recovers_rotated_files() {
        let temp_dir = TempDir::new().unwrap();
        three_files(&temp_dir);

        let state = recover(&temp_dir).unwrap();
        assert_eq!(state.append_index, 14);
        assert_eq!(state.prev_index, -1);
        assert_eq!(state.segments.count(), 3);
        assert_eq!(state.terms.get(0), 1);
        assert_eq!(state.terms.get(9), 2);
        assert_eq!(state.terms.get(14), 3);
        // the origin run plus one per term
        assert_eq!(state.terms.run_count(), 4);
    }

    #[test]
    fn test_recovers_truncation_and_skip() {
        let temp_dir = TempDir::new().unwrap();
        let segments = three_files(&temp_dir);
        // replace 12..=14 with term 4 entries, then jump to 100
        let truncated = segments.truncate(14, 11, 3).unwrap();
        fill(&truncated, 12, 13, 4);
        truncated.close_writer().unwrap();
        segments.skip(13, 100, 7).unwrap();

        let state = recover(&temp_dir).unwrap();
        assert_eq!(state.append_index, 100);
        assert_eq!(state.prev_index, 100);
        assert_eq!(state.prev_term, 7);
        assert_eq!(state.terms.get(100), 7);
        assert_eq!(state.terms.get(13), -1);
    }

    #[test]
    fn test_truncation_replays_terms() {
        let temp_dir = TempDir::new().unwrap();
        let segments = three_files(&temp_dir);
        let truncated = segments.truncate(14, 11, 3).unwrap();
        fill(&truncated, 12, 13, 4);

        let state = recover(&temp_dir).unwrap();
        assert_eq!(state.append_index, 13);
        assert_eq!(state.terms.get(11), 3);
        assert_eq!(state.terms.get(12), 4);
        assert_eq!(state.terms.get(14), -1);
    }

    #[test]
    fn test_version_gap_is_damage() {
        let temp_dir = TempDir::new().unwrap();
        three_files(&temp_dir);
        fs::remove_file(temp_dir.path().join("raft.log.1")).unwrap();
        assert_damaged(&temp_dir);
    }

    #[test]
    fn test_header_version_mismatch_is_damage() {
        let temp_dir = TempDir::new().unwrap();
        three_files(&temp_dir);
        SegmentHeader::new(4, 7, 4, 1)
            .rewrite(&temp_dir.path().join("raft.log.1"))
            .unwrap();
        assert_damaged(&temp_dir);
    }

    #[test]
    fn test_missing_header_on_earlier_file_is_damage() {
        let temp_dir = TempDir::new().unwrap();
        three_files(&temp_dir);
        fs::write(temp_dir.path().join("raft.log.1"), [0u8; 10]).unwrap();
        assert_damaged(&temp_dir);
    }

    #[test]
    fn test_broken_continuity_is_damage() {
        let temp_dir = TempDir::new().unwrap();
        three_files(&temp_dir);
        // version 3 claims the previous file ended at 20
        fs::write(
            temp_dir.path().join("raft.log.3"),
            SegmentHeader::new(20, 3, 20, 3).serialize(),
        )
        .unwrap();
        assert_damaged(&temp_dir);
    }

    #[test]
    fn test_missing_header_on_last_file_is_rewritten() {
        let temp_dir = TempDir::new().unwrap();
        three_files(&temp_dir);
        fs::write(temp_dir.path().join("raft.log.3"), [1u8; 7]).unwrap();

        let state = recover(&temp_dir).unwrap();
        assert_eq!(state.append_index, 14);
        assert_eq!(state.segments.count(), 4);
        let header = SegmentHeader::read_from(&temp_dir.path().join("raft.log.3")).unwrap();
        assert_eq!(header, Some(SegmentHeader::new(14, 3, 14, 3)));
    }

    #[test]
    fn test_lone_headerless_first_file_starts_fresh() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("raft.log.0"), [0u8; 5]).unwrap();

        let state = recover(&temp_dir).unwrap();
        assert_eq!(state.append_index, -1);
        assert_eq!(
            fs::metadata(temp_dir.path().join("raft.log.0")).unwrap().len(),
            SEGMENT_HEADER_SIZE
        );
    }

    #[test]
    fn test_lone_headerless_later_file_is_damage() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("raft.log.4"), [0u8; 5]).unwrap();
        assert_damaged(&temp_dir);
    }

    #[test]
    fn test_header_index_at_limit_is_damage() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("raft.log.0"),
            SegmentHeader::new(i64::MAX, 0, i64::MAX, 1).serialize(),
        )
        .unwrap();
        assert_damaged(&temp_dir);

        fs::write(
            temp_dir.path().join("raft.log.0"),
            SegmentHeader::new(-5, 0, -1, 1).serialize(),
        )
        .unwrap();
        assert_damaged(&temp_dir);
    }

    #[test]
    fn test_torn_tail_is_trimmed() {
        let temp_dir = TempDir::new().unwrap();
        three_files(&temp_dir);
        let last = temp_dir.path().join("raft.log.2");
        let valid_len = fs::metadata(&last).unwrap().len();
        let mut bytes = fs::read(&last).unwrap();
        bytes.extend_from_slice(&[0xAB; 17]);
        fs::write(&last, bytes).unwrap();

        let state = recover(&temp_dir).unwrap();
        assert_eq!(state.append_index, 14);
        assert_eq!(fs::metadata(&last).unwrap().len(), valid_len);
    }

    #[test]
    fn test_any_cut_of_last_file_recovers() {
        let temp_dir = TempDir::new().unwrap();
        three_files(&temp_dir);
        let last = temp_dir.path().join("raft.log.2");
        let original = fs::read(&last).unwrap();

        for cut in (0..=original.len()).rev().step_by(7) {
            fs::write(&last, &original[..cut]).unwrap();
            let state = recover(&temp_dir).unwrap();
            assert!(state.append_index >= 9, "cut at {cut}");
            assert!(state.append_index <= 14, "cut at {cut}");
            assert_eq!(state.terms.get(9), 2);
            state.segments.close().unwrap();
        }
    }

    #[test]
    fn test_corrupt_record_in_earlier_file_is_damage() {
        let temp_dir = TempDir::new().unwrap();
        three_files(&temp_dir);
        let first = temp_dir.path().join("raft.log.0");
        let mut bytes = fs::read(&first).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&first, bytes).unwrap();
        assert_damaged(&temp_dir);
    }

    #[test]
    fn test_recovered_files_are_readable() {
        let temp_dir = TempDir::new().unwrap();
        three_files(&temp_dir);

        let state = recover(&temp_dir).unwrap();
        let segment = state.segments.get_for_index(7).value.unwrap();
        let mut cursor = segment.get_cursor(7).unwrap();
        assert!(cursor.next().unwrap());
        let record = cursor.current().unwrap();
        assert_eq!((record.index, record.term), (7, 2));
        assert_eq!(record.payload, payload(7));
    }
}

#[cfg(test)]
mod cursor_tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::support::*;
    use crate::storage::log::cursor::EntryCursor;
    use crate::storage::log::segments::Segments;

    fn collect(segments: &Arc<Segments>, from: i64) -> Vec<(i64, i64)> {
        let mut cursor = EntryCursor::open(segments.clone(), from).unwrap();
        let mut seen = Vec::new();
        while cursor.next().unwrap() {
            let record = cursor.current().unwrap();
            seen.push((record.index, record.term));
        }
        seen
    }

    #[test]
    fn test_crosses_file_boundaries() {
        let temp_dir = TempDir::new().unwrap();
        let segments = Arc::new(empty_segments(temp_dir.path()));
        let mut prev = -1;
        for _ in 0..3 {
            let segment = segments.rotate(prev, prev, 1).unwrap();
            fill(&segment, prev + 1, prev + 3, 1);
            segment.close_writer().unwrap();
            prev += 3;
        }

        let indexes: Vec<_> = collect(&segments, 0).into_iter().map(|(i, _)| i).collect();
        assert_eq!(indexes, (0..9).collect::<Vec<_>>());

        let indexes: Vec<_> = collect(&segments, 4).into_iter().map(|(i, _)| i).collect();
        assert_eq!(indexes, (4..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_skips_superseded_entries() {
        let temp_dir = TempDir::new().unwrap();
        let segments = Arc::new(empty_segments(temp_dir.path()));
        let first = segments.rotate(-1, -1, -1).unwrap();
        fill(&first, 0, 9, 1);
        first.close_writer().unwrap();
        let second = segments.truncate(9, 4, 1).unwrap();
        fill(&second, 5, 6, 2);

        assert_eq!(
            collect(&segments, 3),
            vec![(3, 1), (4, 1), (5, 2), (6, 2)]
        );
    }

    #[test]
    fn test_pruned_range_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let segments = Arc::new(empty_segments(temp_dir.path()));
        let first = segments.rotate(-1, -1, -1).unwrap();
        fill(&first, 0, 4, 1);
        first.close_writer().unwrap();
        let tail = segments.rotate(4, 4, 1).unwrap();
        fill(&tail, 5, 6, 1);

        segments.prune(4).unwrap();
        assert!(collect(&segments, 2).is_empty());
        assert_eq!(collect(&segments, 5).len(), 2);
    }

    #[test]
    fn test_exhausted_cursor_stays_exhausted() {
        let temp_dir = TempDir::new().unwrap();
        let segments = Arc::new(empty_segments(temp_dir.path()));
        let tail = segments.rotate(-1, -1, -1).unwrap();
        fill(&tail, 0, 1, 1);

        let mut cursor = EntryCursor::open(segments.clone(), 0).unwrap();
        assert!(cursor.next().unwrap());
        assert!(cursor.next().unwrap());
        assert!(!cursor.next().unwrap());

        fill(&tail, 2, 2, 1);
        assert!(!cursor.next().unwrap());
        assert!(cursor.current().is_none());
    }
}
