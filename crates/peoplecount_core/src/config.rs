//! Database configuration.

use crate::auth::PasswordHash;
use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the database directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the journal after every write.
    pub sync_on_write: bool,

    /// Whether to rewrite the journal as a snapshot right after replay.
    pub compact_on_open: bool,

    /// How long a mutating operation waits for its key locks.
    pub lock_timeout: Duration,

    /// Hash of the super-user password checked by `resetPassword`.
    ///
    /// `None` leaves the super-user flow unconfigured.
    pub super_password_hash: Option<PasswordHash>,

    /// Initial lifetime of access tokens.
    pub access_token_ttl: Duration,

    /// Initial lifetime of refresh tokens.
    pub refresh_token_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
            compact_on_open: false,
            lock_timeout: Duration::from_secs(5),
            super_password_hash: None,
            access_token_ttl: Duration::from_secs(24 * 60 * 60),
            refresh_token_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync the journal after every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether to compact the journal on open.
    #[must_use]
    pub const fn compact_on_open(mut self, value: bool) -> Self {
        self.compact_on_open = value;
        self
    }

    /// Sets the key-lock wait limit.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the super-user password hash.
    #[must_use]
    pub fn super_password_hash(mut self, hash: PasswordHash) -> Self {
        self.super_password_hash = Some(hash);
        self
    }

    /// Sets the initial access and refresh token lifetimes.
    #[must_use]
    pub const fn token_ttls(mut self, access: Duration, refresh: Duration) -> Self {
        self.access_token_ttl = access;
        self.refresh_token_ttl = refresh;
        self
    }
}
