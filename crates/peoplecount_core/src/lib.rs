//! # PeopleCount Core
//!
//! Referential-integrity engine for the PeopleCount store, user and camera
//! documents.
//!
//! Stores list their users and cameras; users and cameras list their
//! stores. Both sides of every relationship are stored, so this crate keeps
//! them in step:
//!
//! - [`Repository`] holds the three collections, journaled for durability
//! - [`Synchronizer`] writes both sides of a link or unlink
//! - [`CascadeOrchestrator`] strips references on delete and propagates
//!   renames
//! - [`Session`] validates request payloads and runs the operations
//! - [`integrity::check`] reports asymmetric, dangling or unnormalized data
//!
//! Every key is normalized (trimmed and uppercased) on the way in, so
//! lookups are case-insensitive.
//!
//! ## Example
//!
//! ```rust
//! use peoplecount_core::{Database, Principal};
//! use serde_json::json;
//!
//! let db = Database::open_in_memory().unwrap();
//! let session = db.session(Principal::admin("ops")).unwrap();
//!
//! session
//!     .create_user(&json!({"email": "ann@example.com", "password": "Secret123"}))
//!     .unwrap();
//! let created = session
//!     .create_store(&json!({"name": "main branch", "users": ["ann@example.com"]}))
//!     .unwrap();
//! assert_eq!(created.store.name.as_str(), "MAIN BRANCH");
//!
//! let users = session.list_users().unwrap().users;
//! assert!(users[0].stores.contains(&peoplecount_core::normalize("Main Branch")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
mod cascade;
mod config;
mod database;
mod dir;
mod entity;
mod error;
pub mod integrity;
mod journal;
mod key;
mod lock;
mod ops;
mod repository;
mod sync;
mod types;
pub mod validation;

pub use cascade::{CascadeOrchestrator, DeleteManyReport, DeleteReport};
pub use config::Config;
pub use database::Database;
pub use entity::{
    Camera, CameraView, Document, DocumentView, Entity, EntityId, FieldValue, Patch, Store,
    StoreView, User, UserView, VerbatimCredential,
};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use integrity::{IntegrityReport, Violation};
pub use journal::{Journal, JournalRecord, Replay};
pub use key::{normalize, normalize_text, KeySet, NormalizedKey};
pub use lock::{KeyLockGuard, KeyLockTable};
pub use ops::{
    CameraList, CreatedStore, EdgeChange, EdgeState, Operation, PasswordReset, Principal, Session,
    StoreList, Updated, UserList,
};
pub use repository::{Repository, Versioned};
pub use sync::{LinkOutcome, LinkReport, Synchronizer, UnlinkOutcome, UnlinkReport};
pub use types::{CollectionKind, EntityRef, Relation, Version};
