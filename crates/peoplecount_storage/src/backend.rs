//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte log used by the document journal.
///
/// # Invariants
///
/// - `append` returns the offset at which the bytes start
/// - `read_all` returns every byte appended since the last `truncate`/`replace`
/// - after `sync` returns, appended data survives process termination
/// - `replace` swaps the whole content atomically: readers observe either
///   the old log or the new one, never a mix
pub trait StorageBackend: Send + Sync {
    /// Appends bytes to the end of the log and returns their offset.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Reads the full content of the log.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn read_all(&self) -> StorageResult<Vec<u8>>;

    /// Returns the current size of the log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes every appended byte durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops everything after `new_size`.
    ///
    /// Used to cut off a torn record left by a crash mid-append.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` exceeds the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the whole log with `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the new content cannot be written.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}
