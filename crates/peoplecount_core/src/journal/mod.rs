//! Document journal.
//!
//! Every repository write is framed as a [`JournalRecord`] and appended to
//! a [`StorageBackend`] before the in-memory collection changes. Opening a
//! database replays the journal from the start.

mod record;

pub use record::JournalRecord;

use crate::error::CoreResult;
use parking_lot::Mutex;
use peoplecount_storage::StorageBackend;
use record::{read_frame, Frame};
use tracing::{info, warn};

/// What replay found.
#[derive(Debug, Default)]
pub struct Replay {
    /// Records in append order.
    pub records: Vec<JournalRecord>,
    /// Bytes of torn tail that were cut off.
    pub truncated_bytes: u64,
}

/// Append-only record log over a storage backend.
pub struct Journal {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_write: bool,
}

impl Journal {
    /// Creates a journal over `backend`.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_write,
        }
    }

    /// Appends a record and returns its offset.
    ///
    /// With `sync_on_write` the record is durable when this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub fn append(&self, record: &JournalRecord) -> CoreResult<u64> {
        let data = record.encode()?;

        let mut backend = self.backend.lock();
        let offset = backend.append(&data)?;
        if self.sync_on_write {
            backend.sync()?;
        }

        Ok(offset)
    }

    /// Reads every complete record.
    ///
    /// A torn record at the tail is cut off so later appends start on a
    /// clean boundary.
    ///
    /// # Errors
    ///
    /// Returns `JournalCorruption` for damage anywhere but the tail.
    pub fn replay(&self) -> CoreResult<Replay> {
        let mut backend = self.backend.lock();
        let bytes = backend.read_all()?;

        let mut replay = Replay::default();
        let mut pos = 0usize;
        while pos < bytes.len() {
            match read_frame(&bytes[pos..], pos as u64)? {
                Frame::Record(record, len) => {
                    replay.records.push(record);
                    pos += len;
                }
                Frame::Torn => break,
            }
        }

        if pos < bytes.len() {
            replay.truncated_bytes = (bytes.len() - pos) as u64;
            warn!(
                offset = pos,
                bytes = replay.truncated_bytes,
                "discarding torn journal tail"
            );
            backend.truncate(pos as u64)?;
        }

        info!(records = replay.records.len(), "journal replayed");
        Ok(replay)
    }

    /// Atomically replaces the log with `records`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails.
    pub fn rewrite<'a>(&self, records: impl IntoIterator<Item = &'a JournalRecord>) -> CoreResult<()> {
        let mut data = Vec::new();
        let mut count = 0usize;
        for record in records {
            data.extend_from_slice(&record.encode()?);
            count += 1;
        }

        let mut backend = self.backend.lock();
        let before = backend.size()?;
        backend.replace(&data)?;
        info!(records = count, before, after = data.len(), "journal compacted");
        Ok(())
    }

    /// Current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Forces appended records to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}
