//! Database directory management.
//!
//! ```text
//! <db_path>/
//! ├─ LOCK          # advisory lock, one process at a time
//! └─ journal.log   # document journal
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";

/// An open database directory holding the exclusive lock.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens `path`, creating it if allowed, and takes the exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseLocked` if another process holds the lock, or an
    /// error if the directory is missing (and may not be created) or is
    /// not a directory.
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_operation(format!(
                    "database directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_operation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// The directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the journal file.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_layout() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("db");

        let db_dir = DatabaseDir::open(&db_path, true).unwrap();
        assert!(db_path.join("LOCK").exists());
        assert_eq!(db_dir.journal_path(), db_path.join("journal.log"));
        assert_eq!(db_dir.path(), db_path);
    }

    #[test]
    fn missing_without_create_fails() {
        let dir = tempdir().unwrap();
        assert!(DatabaseDir::open(&dir.path().join("absent"), false).is_err());
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = DatabaseDir::open(dir.path(), true).unwrap();
        let second = DatabaseDir::open(dir.path(), true);
        assert!(matches!(second, Err(CoreError::DatabaseLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempdir().unwrap();
        drop(DatabaseDir::open(dir.path(), true).unwrap());
        assert!(DatabaseDir::open(dir.path(), true).is_ok());
    }

    #[test]
    fn file_path_is_rejected() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(DatabaseDir::open(&file, true).is_err());
    }
}
