//! Database facade and recovery.

use crate::auth::{HmacPasswordHasher, PasswordHasher, TokenPolicy, TokenPolicyHandle};
use crate::cascade::CascadeOrchestrator;
use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::integrity::{self, IntegrityReport};
use crate::journal::Journal;
use crate::lock::KeyLockTable;
use crate::ops::{Principal, Session};
use crate::repository::Repository;
use crate::sync::Synchronizer;
use crate::types::CollectionKind;
use parking_lot::RwLock;
use peoplecount_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// The main database handle.
///
/// `Database` owns the repository, the key-lock table and the auth
/// helpers. Requests run through a [`Session`] obtained with
/// [`Database::session`].
///
/// # Opening a Database
///
/// ```rust,ignore
/// use peoplecount_core::{Database, Principal};
/// use serde_json::json;
///
/// let db = Database::open(std::path::Path::new("people_db"))?;
/// let session = db.session(Principal::user("ops@example.com"))?;
/// session.create_store(&json!({"name": "Main Branch"}))?;
/// db.close()?;
/// ```
///
/// # In-Memory Databases
///
/// For testing, use `Database::open_in_memory()`:
///
/// ```rust
/// use peoplecount_core::Database;
///
/// let db = Database::open_in_memory().unwrap();
/// assert!(db.verify().unwrap().is_ok());
/// ```
pub struct Database {
    config: Config,
    /// Holds the directory lock. None for in-memory databases.
    dir: Option<DatabaseDir>,
    repo: Arc<Repository>,
    cascade: CascadeOrchestrator,
    hasher: Arc<dyn PasswordHasher>,
    tokens: TokenPolicyHandle,
    is_open: RwLock<bool>,
}

impl Database {
    /// Opens a database directory with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseLocked` if another process holds the directory,
    /// or an error if the journal cannot be read or is corrupt.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database directory.
    ///
    /// The directory is created if allowed, locked, and its journal
    /// replayed.
    ///
    /// # Errors
    ///
    /// See [`Database::open`].
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;
        let backend = FileBackend::open_with_create_dirs(&dir.journal_path())?;
        info!(path = %path.display(), "opening database");
        Self::assemble(config, Some(dir), Box::new(backend))
    }

    /// Opens a database over an arbitrary backend, without a directory
    /// lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend's journal is corrupt.
    pub fn open_with_backend(config: Config, backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        Self::assemble(config, None, backend)
    }

    /// Opens an empty in-memory database.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other
    /// constructors.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Config::default(), Box::new(InMemoryBackend::new()))
    }

    fn assemble(
        config: Config,
        dir: Option<DatabaseDir>,
        backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        let journal = Journal::new(backend, config.sync_on_write);
        let repo = Arc::new(Repository::open(journal)?);
        if config.compact_on_open {
            repo.compact()?;
        }

        let locks = Arc::new(KeyLockTable::new(config.lock_timeout));
        let sync = Synchronizer::new(Arc::clone(&repo), locks);
        let tokens = TokenPolicyHandle::new(TokenPolicy::new(
            config.access_token_ttl,
            config.refresh_token_ttl,
        ));

        info!(
            stores = repo.len(CollectionKind::Store),
            users = repo.len(CollectionKind::User),
            cameras = repo.len(CollectionKind::Camera),
            "database ready"
        );

        Ok(Self {
            config,
            dir,
            repo,
            cascade: CascadeOrchestrator::new(sync),
            hasher: Arc::new(HmacPasswordHasher::new()),
            tokens,
            is_open: RwLock::new(true),
        })
    }

    /// Replaces the password hasher.
    #[must_use]
    pub fn with_password_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Starts a session for an authenticated caller.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for [`Principal::Anonymous`] and
    /// `DatabaseClosed` after [`Database::close`].
    pub fn session(&self, principal: Principal) -> CoreResult<Session<'_>> {
        self.ensure_open()?;
        if principal.is_anonymous() {
            return Err(CoreError::unauthorized("authentication required"));
        }
        Ok(Session::new(self, principal))
    }

    /// The repository.
    #[must_use]
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// The reference synchronizer.
    #[must_use]
    pub fn synchronizer(&self) -> &Synchronizer {
        self.cascade.synchronizer()
    }

    /// The cascade orchestrator.
    #[must_use]
    pub fn cascade(&self) -> &CascadeOrchestrator {
        &self.cascade
    }

    /// The live token policy.
    #[must_use]
    pub fn token_policy(&self) -> &TokenPolicyHandle {
        &self.tokens
    }

    /// The password hasher.
    #[must_use]
    pub fn password_hasher(&self) -> &dyn PasswordHasher {
        self.hasher.as_ref()
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory path, or `None` for in-memory databases.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    /// Checks every invariant across all collections.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`Database::close`].
    pub fn verify(&self) -> CoreResult<IntegrityReport> {
        self.ensure_open()?;
        Ok(integrity::check(&self.repo))
    }

    /// Rewrites the journal as one record per live document.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is closed or the rewrite fails.
    pub fn compact(&self) -> CoreResult<()> {
        self.ensure_open()?;
        self.repo.compact()
    }

    /// Flushes the journal and refuses further sessions.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }
        self.repo.sync()?;
        *is_open = false;
        info!("database closed");
        Ok(())
    }

    /// Returns true until [`Database::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path())
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}
