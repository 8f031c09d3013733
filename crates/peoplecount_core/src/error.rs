//! Error types for PeopleCount core.

use crate::key::NormalizedKey;
use crate::types::CollectionKind;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse classification of a [`CoreError`].
///
/// The transport layer maps these onto its own status codes; the core
/// never deals in HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed, missing or forbidden input. Nothing was written.
    Validation,
    /// A unique key is already taken.
    Conflict,
    /// The primary entity does not exist.
    NotFound,
    /// The caller could not be authenticated or a credential was wrong.
    Unauthorized,
    /// The caller is known but the action is not allowed.
    Forbidden,
    /// A concurrent writer got in the way; the call may be retried.
    Retry,
    /// Storage, corruption or configuration problem.
    Internal,
}

/// Errors that can occur in PeopleCount core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] peoplecount_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A document could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The journal contains a record that cannot be trusted.
    #[error("journal corruption at offset {offset}: {message}")]
    JournalCorruption {
        /// Byte offset of the offending record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A request payload failed validation.
    #[error("validation failed{}: {message}", field.as_ref().map(|f| format!(" on '{f}'")).unwrap_or_default())]
    Validation {
        /// The offending field, when there is one.
        field: Option<String>,
        /// Human-readable description.
        message: String,
    },

    /// A document with the same normalized key already exists.
    #[error("{collection} already contains '{key}'")]
    Conflict {
        /// The collection holding the key.
        collection: CollectionKind,
        /// The duplicate key.
        key: NormalizedKey,
    },

    /// The primary entity does not exist.
    #[error("'{key}' not found in {collection}")]
    NotFound {
        /// The collection searched.
        collection: CollectionKind,
        /// The missing key.
        key: NormalizedKey,
    },

    /// None of the keys named by a batch request exist.
    #[error("none of {} found in {collection}", display_keys(.keys))]
    NoneFound {
        /// The collection searched.
        collection: CollectionKind,
        /// Every key that was requested.
        keys: Vec<NormalizedKey>,
    },

    /// Authentication failed.
    #[error("unauthorized: {reason}")]
    Unauthorized {
        /// Why the caller was rejected.
        reason: String,
    },

    /// The caller may not perform this action.
    #[error("forbidden: {reason}")]
    Forbidden {
        /// Why the action was refused.
        reason: String,
    },

    /// A document changed between read and write.
    #[error("{collection} document '{key}' was modified concurrently")]
    ConcurrentModification {
        /// The collection holding the document.
        collection: CollectionKind,
        /// The document key.
        key: NormalizedKey,
    },

    /// Key locks could not be acquired in time.
    #[error("timed out waiting for locks on {}", display_keys(.keys))]
    LockTimeout {
        /// The keys that were requested.
        keys: Vec<NormalizedKey>,
    },

    /// A required setting is missing.
    #[error("not configured: {what}")]
    NotConfigured {
        /// The missing setting.
        what: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Another process holds the database directory.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// The database has been closed.
    #[error("database is closed")]
    DatabaseClosed,
}

fn display_keys(keys: &[NormalizedKey]) -> String {
    keys.iter()
        .map(NormalizedKey::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl CoreError {
    /// Creates a validation error tied to a field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Creates a validation error about the payload as a whole.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::Validation {
            field: None,
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(collection: CollectionKind, key: NormalizedKey) -> Self {
        Self::NotFound { collection, key }
    }

    /// Creates a conflict error.
    pub fn conflict(collection: CollectionKind, key: NormalizedKey) -> Self {
        Self::Conflict { collection, key }
    }

    /// Creates an unauthorized error.
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns the coarse kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } | Self::NoneFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::ConcurrentModification { .. } | Self::LockTimeout { .. } => ErrorKind::Retry,
            Self::Storage(_)
            | Self::Io(_)
            | Self::Codec { .. }
            | Self::JournalCorruption { .. }
            | Self::NotConfigured { .. }
            | Self::InvalidOperation { .. }
            | Self::DatabaseLocked
            | Self::DatabaseClosed => ErrorKind::Internal,
        }
    }
}
