//! Request-level operations.
//!
//! A [`Session`] takes JSON payloads as the transport layer received them,
//! validates and normalizes them, and drives the repository, synchronizer
//! and cascade orchestrator. Every operation returns a typed result that
//! serializes with camelCase field names.
//!
//! [`Session::execute`] dispatches by [`Operation`] name for callers that
//! only have a string, such as the CLI.

mod admin;
mod cameras;
mod stores;
mod users;

pub use admin::PasswordReset;
pub use cameras::{CameraList, EdgeChange, EdgeState};
pub use stores::{CreatedStore, StoreList};
pub use users::UserList;

use crate::database::Database;
use crate::entity::{Document, Entity, Patch};
use crate::error::{CoreError, CoreResult};
use crate::key::{normalize, NormalizedKey};
use crate::types::EntityRef;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Who is calling, as established by the excluded auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// A caller with a valid access token.
    User {
        /// Token subject.
        subject: String,
    },
    /// An operator allowed to run administrative operations.
    Admin {
        /// Operator name.
        subject: String,
    },
    /// No credentials.
    Anonymous,
}

impl Principal {
    /// An authenticated user.
    pub fn user(subject: impl Into<String>) -> Self {
        Self::User {
            subject: subject.into(),
        }
    }

    /// An authenticated operator.
    pub fn admin(subject: impl Into<String>) -> Self {
        Self::Admin {
            subject: subject.into(),
        }
    }

    /// True for [`Principal::Anonymous`].
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// The subject, if authenticated.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::User { subject } | Self::Admin { subject } => Some(subject),
            Self::Anonymous => None,
        }
    }
}

/// An updated document plus whether anything changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Updated<V> {
    /// False when the request matched the stored state.
    pub changed: bool,
    /// The document after the update.
    pub document: V,
}

/// Every operation a session can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// List all stores.
    ListStores,
    /// Create a store, optionally linking existing users.
    CreateStore,
    /// Update or rename a store.
    UpdateStore,
    /// Delete one or more stores.
    DeleteStores,
    /// Link users to a store.
    AddUsersToStore,
    /// Unlink users from a store.
    RemoveUsersFromStore,
    /// List all users.
    ListUsers,
    /// Create a user.
    CreateUser,
    /// Update, rename or re-password a user.
    UpdateUser,
    /// Delete one or more users.
    DeleteUsers,
    /// List all cameras.
    ListCameras,
    /// Create a camera, optionally linked to a store.
    CreateCamera,
    /// Update or re-address a camera.
    UpdateCamera,
    /// Link a store to a camera.
    AddStoreToCamera,
    /// Unlink a store from a camera.
    RemoveStoreFromCamera,
    /// Delete one or more cameras.
    DeleteCameras,
    /// Reset a user's password with the super password.
    ResetPassword,
    /// Change token lifetimes and revoke issued tokens.
    SetTokenExpiry,
}

impl Operation {
    /// Every operation, in documentation order.
    pub const ALL: [Self; 18] = [
        Self::ListStores,
        Self::CreateStore,
        Self::UpdateStore,
        Self::DeleteStores,
        Self::AddUsersToStore,
        Self::RemoveUsersFromStore,
        Self::ListUsers,
        Self::CreateUser,
        Self::UpdateUser,
        Self::DeleteUsers,
        Self::ListCameras,
        Self::CreateCamera,
        Self::UpdateCamera,
        Self::AddStoreToCamera,
        Self::RemoveStoreFromCamera,
        Self::DeleteCameras,
        Self::ResetPassword,
        Self::SetTokenExpiry,
    ];

    /// The camelCase name used on the wire.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ListStores => "listStores",
            Self::CreateStore => "createStore",
            Self::UpdateStore => "updateStore",
            Self::DeleteStores => "deleteStores",
            Self::AddUsersToStore => "addUsersToStore",
            Self::RemoveUsersFromStore => "removeUsersFromStore",
            Self::ListUsers => "listUsers",
            Self::CreateUser => "createUser",
            Self::UpdateUser => "updateUser",
            Self::DeleteUsers => "deleteUsers",
            Self::ListCameras => "listCameras",
            Self::CreateCamera => "createCamera",
            Self::UpdateCamera => "updateCamera",
            Self::AddStoreToCamera => "addStoreToCamera",
            Self::RemoveStoreFromCamera => "removeStoreFromCamera",
            Self::DeleteCameras => "deleteCameras",
            Self::ResetPassword => "resetPassword",
            Self::SetTokenExpiry => "setTokenExpiry",
        }
    }

    /// True for operations that never write.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::ListStores | Self::ListUsers | Self::ListCameras)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        if wanted.eq_ignore_ascii_case("deleteStore") {
            return Ok(Self::DeleteStores);
        }
        Self::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CoreError::invalid_operation(format!("unknown operation '{wanted}'")))
    }
}

/// An authenticated unit of work against a [`Database`].
#[derive(Debug)]
pub struct Session<'db> {
    db: &'db Database,
    principal: Principal,
}

impl<'db> Session<'db> {
    pub(crate) fn new(db: &'db Database, principal: Principal) -> Self {
        Self { db, principal }
    }

    /// The caller.
    #[must_use]
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Runs `op` with `payload` and returns its result as JSON.
    ///
    /// List operations ignore the payload.
    ///
    /// # Errors
    ///
    /// Whatever the operation returns, or a codec error if the result
    /// cannot be serialized.
    pub fn execute(&self, op: Operation, payload: &Value) -> CoreResult<Value> {
        tracing::debug!(operation = %op, subject = ?self.principal.subject(), "executing");
        match op {
            Operation::ListStores => to_json(&self.list_stores()?),
            Operation::CreateStore => to_json(&self.create_store(payload)?),
            Operation::UpdateStore => to_json(&self.update_store(payload)?),
            Operation::DeleteStores => to_json(&self.delete_stores(payload)?),
            Operation::AddUsersToStore => to_json(&self.add_users_to_store(payload)?),
            Operation::RemoveUsersFromStore => to_json(&self.remove_users_from_store(payload)?),
            Operation::ListUsers => to_json(&self.list_users()?),
            Operation::CreateUser => to_json(&self.create_user(payload)?),
            Operation::UpdateUser => to_json(&self.update_user(payload)?),
            Operation::DeleteUsers => to_json(&self.delete_users(payload)?),
            Operation::ListCameras => to_json(&self.list_cameras()?),
            Operation::CreateCamera => to_json(&self.create_camera(payload)?),
            Operation::UpdateCamera => to_json(&self.update_camera(payload)?),
            Operation::AddStoreToCamera => to_json(&self.add_store_to_camera(payload)?),
            Operation::RemoveStoreFromCamera => to_json(&self.remove_store_from_camera(payload)?),
            Operation::DeleteCameras => to_json(&self.delete_cameras(payload)?),
            Operation::ResetPassword => to_json(&self.reset_password(payload)?),
            Operation::SetTokenExpiry => to_json(&self.set_token_expiry(payload)?),
        }
    }

    fn db(&self) -> CoreResult<&'db Database> {
        self.db.ensure_open()?;
        Ok(self.db)
    }
}

/// Patches `entity` and, if `new_key` differs from its key, renames it.
///
/// `prepare` builds the patch from the current document while the locks
/// are held, so checks against stored state (old passwords) cannot race.
/// Everything is validated before the first write; the rename comes last.
fn apply_update(
    db: &Database,
    entity: &EntityRef,
    new_key: Option<&NormalizedKey>,
    prepare: impl FnOnce(&Document) -> CoreResult<Patch>,
) -> CoreResult<Updated<Document>> {
    let sync = db.synchronizer();
    let repo = db.repository();
    let rename = new_key.filter(|new| **new != entity.key);

    let (_guard, peers) = match rename {
        Some(new) => sync.lock_neighbourhood(entity, &[EntityRef::new(entity.kind, new.clone())])?,
        None => (sync.locks().acquire([entity.clone()])?, BTreeSet::new()),
    };

    let before = repo.get(entity.kind, &entity.key)?;
    let patch = prepare(&before.document)?;
    patch.check(&before.document)?;
    if let Some(new) = rename {
        if repo.contains(entity.kind, new) {
            return Err(CoreError::conflict(entity.kind, new.clone()));
        }
    }

    let mut current = repo.update(entity.kind, &entity.key, &patch)?;
    if let Some(new) = rename {
        current = sync.rename_locked(entity, new, &peers)?;
    }
    Ok(Updated {
        changed: current.version != before.version,
        document: current.document,
    })
}

fn downcast<T: Entity>(document: Document) -> CoreResult<T> {
    let kind = document.kind();
    T::from_document(document).ok_or_else(|| {
        CoreError::invalid_operation(format!("expected a document from {}, got {kind}", T::KIND))
    })
}

fn to_json<T: Serialize>(value: &T) -> CoreResult<Value> {
    serde_json::to_value(value).map_err(|e| CoreError::codec(e.to_string()))
}

fn keys(raw: &[String]) -> Vec<NormalizedKey> {
    raw.iter().map(|s| normalize(s)).collect()
}
