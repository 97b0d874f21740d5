//! Pooled read handles onto segment files.
//!
//! Every `Reader` owns an independent file handle, so cursors never contend
//! with the writer. Idle readers are kept in a bounded pool and evicted by
//! age, by segment version, or by overflow (oldest release first).

use std::{
    fs::File,
    io::{self, BufReader, Read, Seek, SeekFrom},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{clock::Clock, error::LogResult};

use super::{entry::EntryRecord, file_names::FileNames};

pub trait ReadChannel: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadChannel for T {}

/// Opens a fresh read channel onto the segment file of a given version.
pub trait ChannelOpener: Send + Sync {
    fn open(&self, version: u64) -> io::Result<Box<dyn ReadChannel>>;
}

impl ChannelOpener for FileNames {
    fn open(&self, version: u64) -> io::Result<Box<dyn ReadChannel>> {
        let file = File::open(self.path_for_version(version))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

pub struct Reader {
    version: u64,
    channel: Box<dyn ReadChannel>,
    position: u64,
    released_at: u64,
}

impl Reader {
    fn open(opener: &dyn ChannelOpener, version: u64) -> io::Result<Self> {
        trace!("Opening reader for segment version {}", version);
        Ok(Self {
            version,
            channel: opener.open(version)?,
            position: 0,
            released_at: 0,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Byte offset of the next record to be read.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn released_at(&self) -> u64 {
        self.released_at
    }

    pub fn seek(&mut self, byte_offset: u64) -> io::Result<()> {
        self.channel.seek(SeekFrom::Start(byte_offset))?;
        self.position = byte_offset;
        Ok(())
    }

    /// Read the next record. The position only advances past complete
    /// records.
    pub fn read_record(&mut self) -> LogResult<Option<EntryRecord>> {
        let record = EntryRecord::read_from(self.channel.as_mut(), self.position)?;
        if let Some(record) = &record {
            self.position += record.encoded_len();
        }
        Ok(record)
    }

    /// Consumes the reader, releasing its file handle.
    pub fn close(self) {
        trace!("Closing reader for segment version {}", self.version);
    }
}

pub struct ReaderPool {
    max_size: usize,
    opener: Arc<dyn ChannelOpener>,
    clock: Arc<dyn Clock>,
    /// Idle readers, least recently released first. `None` once closed.
    pool: Mutex<Option<Vec<Reader>>>,
}

impl ReaderPool {
    pub fn new(max_size: usize, opener: Arc<dyn ChannelOpener>, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_size,
            opener,
            clock,
            pool: Mutex::new(Some(Vec::new())),
        }
    }

    /// Hand out a reader for `version` positioned at `byte_offset`, reusing a
    /// pooled one if possible. Opening happens outside the pool lock.
    pub fn acquire(&self, version: u64, byte_offset: u64) -> LogResult<Reader> {
        let pooled = {
            let mut pool = self.pool.lock();
            pool.as_mut().and_then(|readers| {
                readers
                    .iter()
                    .rposition(|r| r.version == version)
                    .map(|pos| readers.remove(pos))
            })
        };

        let mut reader = match pooled {
            Some(reader) => reader,
            None => Reader::open(self.opener.as_ref(), version)?,
        };

        if let Err(e) = reader.seek(byte_offset) {
            reader.close();
            return Err(e.into());
        }
        Ok(reader)
    }

    /// Return a reader. If the pool overflows, the least recently released
    /// reader is closed.
    pub fn release(&self, mut reader: Reader) {
        reader.released_at = self.clock.millis();
        let overflow = {
            let mut pool = self.pool.lock();
            match pool.as_mut() {
                Some(readers) => {
                    readers.push(reader);
                    if readers.len() > self.max_size {
                        Some(readers.remove(0))
                    } else {
                        None
                    }
                }
                None => Some(reader),
            }
        };

        if let Some(reader) = overflow {
            debug!("Reader pool full, closing reader for version {}", reader.version);
            reader.close();
        }
    }

    /// Close pooled readers released more than `max_idle` ago.
    pub fn prune_idle(&self, max_idle: Duration) {
        let cutoff = self
            .clock
            .millis()
            .saturating_sub(max_idle.as_millis() as u64);
        let evicted = self.evict(|r| r.released_at < cutoff);
        if !evicted.is_empty() {
            debug!("Pruned {} idle readers", evicted.len());
        }
        evicted.into_iter().for_each(Reader::close);
    }

    /// Close pooled readers for `version` and every older version.
    pub fn prune_version(&self, version: u64) {
        let evicted = self.evict(|r| r.version <= version);
        evicted.into_iter().for_each(Reader::close);
    }

    fn evict<F: Fn(&Reader) -> bool>(&self, predicate: F) -> Vec<Reader> {
        let mut pool = self.pool.lock();
        let Some(readers) = pool.as_mut() else {
            return Vec::new();
        };
        let (evicted, kept): (Vec<_>, Vec<_>) = readers.drain(..).partition(|r| predicate(r));
        *readers = kept;
        evicted
    }

    /// Close every pooled reader. Readers released afterwards are closed
    /// immediately.
    pub fn close(&self) {
        let readers = self.pool.lock().take().unwrap_or_default();
        readers.into_iter().for_each(Reader::close);
    }

    pub fn pooled_count(&self) -> usize {
        self.pool.lock().as_ref().map_or(0, Vec::len)
    }
}
