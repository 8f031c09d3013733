//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use peoplecount_core::{Config, Database, Principal, Session};
use peoplecount_storage::InMemoryBackend;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Password accepted by the complexity rules, used for seeded users.
pub const TEST_PASSWORD: &str = "Secret123";

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self::memory_with_config(Config::default())
    }

    /// Creates an in-memory test database with a custom configuration.
    pub fn memory_with_config(config: Config) -> Self {
        Self::over_backend(config, InMemoryBackend::new())
    }

    /// Opens a database over `backend`, replaying whatever it holds.
    ///
    /// Keep a clone of the backend to inspect or replay the journal later.
    pub fn over_backend(config: Config, backend: InMemoryBackend) -> Self {
        Self {
            db: Database::open_with_backend(config, Box::new(backend))
                .expect("Failed to open in-memory database"),
            _temp_dir: None,
        }
    }

    /// Creates a new journaled database in a temporary directory.
    pub fn file() -> Self {
        Self::file_with_config(Config::default())
    }

    /// Creates a journaled database with a custom configuration.
    pub fn file_with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open_with_config(&temp_dir.path().join("db"), config)
            .expect("Failed to open file database");

        Self {
            db,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join("db"))
    }

    /// Closes the database and opens it again from its journal.
    ///
    /// In-memory databases have nothing to replay and are returned as is.
    pub fn reopen(self) -> Self {
        let Some(path) = self.path() else {
            return self;
        };
        let Self { db, _temp_dir } = self;
        let config = db.config().clone();
        db.close().expect("Failed to close database");
        drop(db);

        Self {
            db: Database::open_with_config(&path, config).expect("Failed to reopen database"),
            _temp_dir,
        }
    }

    /// Starts an admin session.
    pub fn admin(&self) -> Session<'_> {
        admin(&self.db)
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

impl std::ops::DerefMut for TestDatabase {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.db
    }
}

/// Starts an admin session on `db`.
pub fn admin(db: &Database) -> Session<'_> {
    db.session(Principal::admin("testkit"))
        .expect("Failed to start session")
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust
/// use peoplecount_testkit::with_temp_db;
///
/// with_temp_db(|db| {
///     assert!(db.verify().unwrap().is_ok());
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// Store name for seed index `i`.
pub fn store_name(i: usize) -> String {
    format!("store {i}")
}

/// User email for seed index `i`.
pub fn user_email(i: usize) -> String {
    format!("user{i}@example.com")
}

/// Camera URL for seed index `i`.
pub fn camera_url(i: usize) -> String {
    format!("http://cam{i}.local:554/stream")
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use serde_json::json;

    /// Creates `stores` stores, `users` users and `cameras` cameras with
    /// no relationships.
    pub fn populated_database(stores: usize, users: usize, cameras: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();
        seed(&test_db.db, stores, users, cameras);
        test_db
    }

    /// Creates `n` of each entity with every user linked to every store
    /// and camera `i` attached to store `i`.
    pub fn linked_database(n: usize) -> TestDatabase {
        let test_db = populated_database(n, n, n);
        let emails: Vec<String> = (0..n).map(user_email).collect();

        {
            let session = test_db.admin();
            for i in 0..n {
                session
                    .add_users_to_store(&json!({"store_name": store_name(i), "user_emails": emails}))
                    .expect("Failed to link users");
                session
                    .add_store_to_camera(&json!({"url": camera_url(i), "store": store_name(i)}))
                    .expect("Failed to attach camera");
            }
        }

        test_db
    }

    /// Seeds entities into an existing database.
    pub fn seed(db: &Database, stores: usize, users: usize, cameras: usize) {
        let session = admin(db);
        for i in 0..stores {
            session
                .create_store(&json!({"name": store_name(i)}))
                .expect("Failed to create store");
        }
        for i in 0..users {
            session
                .create_user(&json!({"email": user_email(i), "password": TEST_PASSWORD}))
                .expect("Failed to create user");
        }
        for i in 0..cameras {
            session
                .create_camera(&json!({
                    "url": camera_url(i),
                    "username": "viewer",
                    "password": "viewer-pass"
                }))
                .expect("Failed to create camera");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peoplecount_core::{normalize, CollectionKind, Store};

    #[test]
    fn test_memory_database() {
        let test_db = TestDatabase::memory();
        assert!(test_db.path().is_none());
        assert!(test_db.verify().unwrap().is_ok());
    }

    #[test]
    fn test_memory_journal_replays() {
        let backend = InMemoryBackend::new();
        let test_db = TestDatabase::over_backend(Config::default(), backend.clone());
        scenarios::seed(&test_db, 1, 1, 1);
        drop(test_db);

        let replayed = TestDatabase::over_backend(
            Config::default(),
            InMemoryBackend::with_data(backend.snapshot()),
        );
        assert_eq!(replayed.repository().len(CollectionKind::Store), 1);
        assert_eq!(replayed.repository().len(CollectionKind::Camera), 1);
    }

    #[test]
    fn test_with_file_db() {
        with_file_db(|db, path| {
            assert_eq!(db.path(), Some(path));
            assert!(path.join("journal.log").exists());
        });
    }

    #[test]
    fn test_linked_scenario() {
        let test_db = scenarios::linked_database(3);
        let store = test_db
            .repository()
            .fetch::<Store>(&normalize(&store_name(1)))
            .unwrap();
        assert_eq!(store.users.len(), 3);
        assert_eq!(store.cameras.len(), 1);
        assert!(test_db.verify().unwrap().is_ok());
    }

    #[test]
    fn test_reopen_keeps_documents() {
        let test_db = TestDatabase::file();
        scenarios::seed(&test_db, 2, 1, 0);

        let test_db = test_db.reopen();
        assert_eq!(test_db.repository().len(CollectionKind::Store), 2);
        assert_eq!(test_db.repository().len(CollectionKind::User), 1);
    }
}
