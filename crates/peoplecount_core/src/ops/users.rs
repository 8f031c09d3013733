//! User operations.

use super::stores::text_patch;
use super::{apply_update, downcast, keys, Session, Updated};
use crate::cascade::DeleteManyReport;
use crate::entity::{Document, Entity, User, UserView};
use crate::error::{CoreError, CoreResult};
use crate::key::{normalize, normalize_text};
use crate::types::{CollectionKind, EntityRef};
use crate::validation::{
    allow_only, as_payload, non_blank_str, one_or_many, optional_str, reject_fields,
    require_force, required_str, validate_email, validate_password,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

const PROFILE_FIELDS: [&str; 4] = ["clientID", "name", "tel", "address"];

const UPDATE_FIELDS: [&str; 8] = [
    "email",
    "new_email",
    "clientID",
    "name",
    "tel",
    "address",
    "password",
    "old_password",
];

const STORES_HINT: &str = "stores are linked through addUsersToStore";

/// Result of `listUsers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserList {
    /// Every user, ordered by email.
    pub users: Vec<UserView>,
}

impl Session<'_> {
    /// Lists every user. Password hashes are never included.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after the database was closed.
    pub fn list_users(&self) -> CoreResult<UserList> {
        let users = self
            .db()?
            .repository()
            .list(CollectionKind::User)
            .into_iter()
            .map(|stored| downcast::<User>(stored.document).map(|u| UserView::from(&u)))
            .collect::<CoreResult<_>>()?;
        Ok(UserList { users })
    }

    /// Creates a user with a hashed password.
    ///
    /// Payload: `{email, password, clientID?, name?, tel?, address?}`.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the email is taken and a validation error for
    /// a malformed email, a weak password or a `stores` field.
    pub fn create_user(&self, body: &Value) -> CoreResult<UserView> {
        let db = self.db()?;
        let payload = as_payload(body)?;
        reject_fields(payload, &["stores"], STORES_HINT)?;

        let email = required_str(payload, "email")?;
        validate_email("email", email)?;
        let password = required_str(payload, "password")?;
        validate_password("password", password)?;

        let mut user = User::new(normalize(email), db.password_hasher().hash(password)?);
        for field in PROFILE_FIELDS {
            let Some(value) = optional_str(payload, field)? else {
                continue;
            };
            let slot = match field {
                "clientID" => &mut user.client_id,
                "name" => &mut user.name,
                "tel" => &mut user.tel,
                _ => &mut user.address,
            };
            *slot = normalize_text(value);
        }

        let entity = EntityRef::user(user.email.clone());
        let _guard = db.synchronizer().locks().acquire([entity.clone()])?;
        let stored = db.repository().create(user.into_document())?;
        let user = downcast::<User>(stored.document)?;

        info!(user = %entity.key, id = %user.id, "user created");
        Ok(UserView::from(&user))
    }

    /// Updates a user's profile, password or email.
    ///
    /// Payload: `{email, new_email?, clientID?, name?, tel?, address?,
    /// password?, old_password?}`. A password change needs the current
    /// password in `old_password`. A new email rewrites every store that
    /// lists the user.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Conflict` if `new_email` is taken,
    /// `Unauthorized` if `old_password` does not match, and a validation
    /// error for `stores`, unknown fields, a malformed email or a weak
    /// password.
    pub fn update_user(&self, body: &Value) -> CoreResult<Updated<UserView>> {
        let db = self.db()?;
        let payload = as_payload(body)?;
        reject_fields(payload, &["stores"], STORES_HINT)?;
        allow_only(payload, &UPDATE_FIELDS)?;

        let entity = EntityRef::user(normalize(required_str(payload, "email")?));
        let new_email = match non_blank_str(payload, "new_email")? {
            Some(raw) => {
                validate_email("new_email", raw)?;
                Some(normalize(raw))
            }
            None => None,
        };
        let password = non_blank_str(payload, "password")?;
        if let Some(password) = password {
            validate_password("password", password)?;
        }
        let old_password = optional_str(payload, "old_password")?;
        let profile = text_patch(payload, &PROFILE_FIELDS)?;

        let hasher = db.password_hasher();
        let updated = apply_update(db, &entity, new_email.as_ref(), |current| {
            let Some(password) = password else {
                return Ok(profile);
            };
            let Document::User(user) = current else {
                return Err(CoreError::invalid_operation("expected a user document"));
            };
            let old = old_password.ok_or_else(|| {
                CoreError::validation("old_password", "is required to change the password")
            })?;
            if !hasher.verify(old, &user.password_hash) {
                return Err(CoreError::unauthorized("old password does not match"));
            }
            Ok(profile.hash("passwordHash", hasher.hash(password)?))
        })?;

        let user = downcast::<User>(updated.document)?;
        if updated.changed {
            info!(user = %entity.key, now = %user.email, "user updated");
        }
        Ok(Updated {
            changed: updated.changed,
            document: UserView::from(&user),
        })
    }

    /// Deletes users after unlinking them from every store.
    ///
    /// Payload: `{emails: string | [string], force: true}`.
    ///
    /// # Errors
    ///
    /// Returns a validation error unless `force` is `true`, and
    /// `NoneFound` if no listed user exists.
    pub fn delete_users(&self, body: &Value) -> CoreResult<DeleteManyReport> {
        let db = self.db()?;
        let payload = as_payload(body)?;
        require_force(payload)?;
        let emails = one_or_many(payload, "emails")?;
        db.cascade().delete_many(CollectionKind::User, &keys(&emails))
    }
}
