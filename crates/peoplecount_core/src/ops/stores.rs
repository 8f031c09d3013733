//! Store operations.

use super::{apply_update, downcast, keys, Session, Updated};
use crate::cascade::DeleteManyReport;
use crate::entity::{Entity, Patch, Store, StoreView};
use crate::error::{CoreError, CoreResult};
use crate::key::{normalize, normalize_text, NormalizedKey};
use crate::sync::{LinkReport, UnlinkReport};
use crate::types::{CollectionKind, EntityRef};
use crate::validation::{
    allow_only, as_payload, has_any, one_or_many, optional_str, reject_fields, require_force,
    required_alias, required_str, string_list, validate_email, Payload,
};
use serde::Serialize;
use serde_json::Value;
use std::iter;
use tracing::info;

const STORE_KEY_ALIASES: [&str; 3] = ["name", "current_name", "old_name"];

const UPDATE_FIELDS: [&str; 6] = ["name", "current_name", "old_name", "new_name", "clientID", "address"];

/// Result of `createStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedStore {
    /// The new store, with whichever users could be linked.
    pub store: StoreView,
    /// Requested users that do not exist.
    pub unknown_users: Vec<NormalizedKey>,
}

/// Result of `listStores`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreList {
    /// Every store, ordered by name.
    pub stores: Vec<StoreView>,
}

impl Session<'_> {
    /// Lists every store.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after the database was closed.
    pub fn list_stores(&self) -> CoreResult<StoreList> {
        let stores = self
            .db()?
            .repository()
            .list(CollectionKind::Store)
            .into_iter()
            .map(|stored| downcast::<Store>(stored.document).map(|s| StoreView::from(&s)))
            .collect::<CoreResult<_>>()?;
        Ok(StoreList { stores })
    }

    /// Creates a store and links the listed existing users to it.
    ///
    /// Payload: `{name, clientID?, address?, users?: [email]}`. Users that
    /// do not exist are returned in `unknownUsers`; the store is created
    /// regardless.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the name is taken and a validation error for
    /// a missing name, a malformed email, or a `cameras` field.
    pub fn create_store(&self, body: &Value) -> CoreResult<CreatedStore> {
        let db = self.db()?;
        let payload = as_payload(body)?;
        reject_fields(
            payload,
            &["cameras"],
            "cameras are linked through addStoreToCamera",
        )?;

        let name = normalize(required_str(payload, "name")?);
        let emails = string_list(payload, "users")?.unwrap_or_default();
        for email in &emails {
            validate_email("users", email)?;
        }
        let users = keys(&emails);

        let mut store = Store::new(name.clone());
        if let Some(client_id) = optional_str(payload, "clientID")? {
            store.client_id = normalize_text(client_id);
        }
        if let Some(address) = optional_str(payload, "address")? {
            store.address = normalize_text(address);
        }

        let owner = EntityRef::store(name.clone());
        let sync = db.synchronizer();
        let _guard = sync.locks().acquire(
            iter::once(owner.clone()).chain(users.iter().cloned().map(EntityRef::user)),
        )?;

        db.repository().create(store.into_document())?;
        let report = sync.link_many_locked(&owner, CollectionKind::User, &users)?;
        let store = db.repository().fetch::<Store>(&name)?;

        info!(
            store = %name,
            linked = report.linked.len(),
            unknown = report.not_found.len(),
            "store created"
        );
        Ok(CreatedStore {
            store: StoreView::from(&store),
            unknown_users: report.not_found,
        })
    }

    /// Updates a store's fields and optionally renames it.
    ///
    /// Payload: `{name | current_name | old_name, new_name?, clientID?,
    /// address?}`. A rename rewrites every user and camera listing the
    /// store.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Conflict` if `new_name` is taken, and a
    /// validation error for `users`, `cameras` or any unknown field.
    pub fn update_store(&self, body: &Value) -> CoreResult<Updated<StoreView>> {
        let db = self.db()?;
        let payload = as_payload(body)?;
        reject_fields(
            payload,
            &["users", "cameras"],
            "relationships change through addUsersToStore, removeUsersFromStore and the camera link operations",
        )?;
        allow_only(payload, &UPDATE_FIELDS)?;

        let entity = EntityRef::store(normalize(required_alias(payload, &STORE_KEY_ALIASES)?));
        let new_name = match optional_str(payload, "new_name")? {
            Some(raw) if raw.trim().is_empty() => {
                return Err(CoreError::validation("new_name", "must not be empty"))
            }
            Some(raw) => Some(normalize(raw)),
            None => None,
        };
        let patch = text_patch(payload, &["clientID", "address"])?;

        let updated = apply_update(db, &entity, new_name.as_ref(), |_| Ok(patch))?;
        let store = downcast::<Store>(updated.document)?;
        if updated.changed {
            info!(store = %entity.key, now = %store.name, "store updated");
        }
        Ok(Updated {
            changed: updated.changed,
            document: StoreView::from(&store),
        })
    }

    /// Deletes stores after unlinking them from every user and camera.
    ///
    /// Payload: `{name: string | [string], force: true}`.
    ///
    /// # Errors
    ///
    /// Returns a validation error unless `force` is `true`, and
    /// `NoneFound` if no named store exists.
    pub fn delete_stores(&self, body: &Value) -> CoreResult<DeleteManyReport> {
        let db = self.db()?;
        let payload = as_payload(body)?;
        require_force(payload)?;
        let names = one_or_many(payload, "name")?;
        db.cascade().delete_many(CollectionKind::Store, &keys(&names))
    }

    /// Links users to a store.
    ///
    /// Payload: `{store_name, user_email | user_emails}`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the store does not exist. Missing users are
    /// reported in the result.
    pub fn add_users_to_store(&self, body: &Value) -> CoreResult<LinkReport> {
        let db = self.db()?;
        let payload = as_payload(body)?;
        let store = EntityRef::store(normalize(required_str(payload, "store_name")?));
        let emails = user_emails(payload)?;
        db.synchronizer()
            .link_many(&store, CollectionKind::User, &keys(&emails))
    }

    /// Unlinks users from a store.
    ///
    /// # Errors
    ///
    /// Same as [`Session::add_users_to_store`].
    pub fn remove_users_from_store(&self, body: &Value) -> CoreResult<UnlinkReport> {
        let db = self.db()?;
        let payload = as_payload(body)?;
        let store = EntityRef::store(normalize(required_str(payload, "store_name")?));
        let emails = user_emails(payload)?;
        db.synchronizer()
            .unlink_many(&store, CollectionKind::User, &keys(&emails))
    }
}

/// Exactly one of `user_email` and `user_emails`, each a string or list.
fn user_emails(payload: &Payload) -> CoreResult<Vec<String>> {
    match (
        has_any(payload, &["user_email"]),
        has_any(payload, &["user_emails"]),
    ) {
        (true, false) => one_or_many(payload, "user_email"),
        (false, true) => one_or_many(payload, "user_emails"),
        (true, true) => Err(CoreError::invalid_payload(
            "give either user_email or user_emails, not both",
        )),
        (false, false) => Err(CoreError::validation("user_emails", "is required")),
    }
}

/// A patch of normalized text fields, taking each field that is present.
pub(super) fn text_patch(payload: &Payload, fields: &[&str]) -> CoreResult<Patch> {
    let mut patch = Patch::new();
    for &field in fields {
        if let Some(value) = optional_str(payload, field)? {
            patch = patch.text(field, value);
        }
    }
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use crate::database::Database;
    use crate::error::ErrorKind;
    use crate::key::normalize;
    use crate::ops::Principal;
    use serde_json::json;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        let session = db.session(Principal::admin("root")).unwrap();
        for email in ["a@x.com", "b@x.com"] {
            session
                .create_user(&json!({"email": email, "password": "Secret123"}))
                .unwrap();
        }
        db
    }

    #[test]
    fn create_links_existing_users() {
        let db = db();
        let session = db.session(Principal::admin("root")).unwrap();
        let created = session
            .create_store(&json!({
                "name": "main branch",
                "address": "high street 1",
                "users": ["a@x.com", "ghost@x.com", " "]
            }))
            .unwrap();

        assert_eq!(created.store.name, normalize("MAIN BRANCH"));
        assert_eq!(created.store.address, "HIGH STREET 1");
        assert!(created.store.users.contains(&normalize("A@X.COM")));
        assert!(created.store.cameras.is_empty());
        assert_eq!(created.unknown_users, [normalize("ghost@x.com")]);

        let users = session.list_users().unwrap().users;
        let a = users.iter().find(|u| u.email == normalize("a@x.com")).unwrap();
        assert!(a.stores.contains(&normalize("main branch")));
    }

    #[test]
    fn create_rejects_duplicates_and_cameras() {
        let db = db();
        let session = db.session(Principal::admin("root")).unwrap();
        session.create_store(&json!({"name": "s"})).unwrap();

        let dup = session.create_store(&json!({"name": " S "})).unwrap_err();
        assert_eq!(dup.kind(), ErrorKind::Conflict);

        let cams = session
            .create_store(&json!({"name": "t", "cameras": ["http://cam:80"]}))
            .unwrap_err();
        assert_eq!(cams.kind(), ErrorKind::Validation);

        let bad_email = session
            .create_store(&json!({"name": "t", "users": ["not-an-email"]}))
            .unwrap_err();
        assert_eq!(bad_email.kind(), ErrorKind::Validation);
        assert_eq!(session.list_stores().unwrap().stores.len(), 1);
    }

    #[test]
    fn update_renames_and_patches() {
        let db = db();
        let session = db.session(Principal::admin("root")).unwrap();
        session
            .create_store(&json!({"name": "a", "users": ["a@x.com"]}))
            .unwrap();

        let updated = session
            .update_store(&json!({"current_name": "A", "new_name": "b", "clientID": "acme"}))
            .unwrap();
        assert!(updated.changed);
        assert_eq!(updated.document.name, normalize("B"));
        assert_eq!(updated.document.client_id, "ACME");

        let user = &session.list_users().unwrap().users[0];
        assert!(user.stores.contains(&normalize("b")));
        assert!(!user.stores.contains(&normalize("a")));

        let same = session
            .update_store(&json!({"name": "b", "clientID": "ACME"}))
            .unwrap();
        assert!(!same.changed);
    }

    #[test]
    fn update_rejects_relationship_and_unknown_fields() {
        let db = db();
        let session = db.session(Principal::admin("root")).unwrap();
        session.create_store(&json!({"name": "s"})).unwrap();

        for body in [
            json!({"name": "s", "users": ["a@x.com"]}),
            json!({"name": "s", "cameras": []}),
            json!({"name": "s", "colour": "red"}),
        ] {
            let err = session.update_store(&body).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{body}");
        }
        assert!(session.list_stores().unwrap().stores[0].users.is_empty());

        let missing = session.update_store(&json!({"name": "ghost"})).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn rename_onto_taken_name_changes_nothing() {
        let db = db();
        let session = db.session(Principal::admin("root")).unwrap();
        session.create_store(&json!({"name": "a"})).unwrap();
        session.create_store(&json!({"name": "b"})).unwrap();

        let err = session
            .update_store(&json!({"name": "a", "new_name": "B", "address": "x"}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let stores = session.list_stores().unwrap().stores;
        assert!(stores.iter().all(|s| s.address.is_empty()));
    }

    #[test]
    fn delete_requires_force() {
        let db = db();
        let session = db.session(Principal::admin("root")).unwrap();
        session.create_store(&json!({"name": "s"})).unwrap();

        for force in [json!(false), json!("true"), json!(null)] {
            let err = session
                .delete_stores(&json!({"name": "s", "force": force}))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        let report = session
            .delete_stores(&json!({"name": ["s", "ghost"], "force": true}))
            .unwrap();
        assert_eq!(report.deleted, [normalize("s")]);
        assert_eq!(report.not_found, [normalize("ghost")]);

        let none = session
            .delete_stores(&json!({"name": "s", "force": true}))
            .unwrap_err();
        assert_eq!(none.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn add_and_remove_users() {
        let db = db();
        let session = db.session(Principal::admin("root")).unwrap();
        session.create_store(&json!({"name": "s"})).unwrap();

        let added = session
            .add_users_to_store(&json!({"store_name": "s", "user_emails": ["a@x.com", "ghost@x.com"]}))
            .unwrap();
        assert_eq!(added.linked, [normalize("A@X.COM")]);
        assert_eq!(added.not_found, [normalize("GHOST@X.COM")]);
        assert!(added.is_partial());

        let again = session
            .add_users_to_store(&json!({"store_name": "S", "user_email": "a@x.com"}))
            .unwrap();
        assert_eq!(again.already_linked, [normalize("a@x.com")]);

        let removed = session
            .remove_users_from_store(&json!({"store_name": "s", "user_emails": "A@x.com"}))
            .unwrap();
        assert_eq!(removed.unlinked, [normalize("a@x.com")]);
    }

    #[test]
    fn user_email_fields_are_exclusive() {
        let db = db();
        let session = db.session(Principal::admin("root")).unwrap();
        session.create_store(&json!({"name": "s"})).unwrap();

        let both = session
            .add_users_to_store(&json!({"store_name": "s", "user_email": "a@x.com", "user_emails": []}))
            .unwrap_err();
        assert_eq!(both.kind(), ErrorKind::Validation);
        let neither = session
            .add_users_to_store(&json!({"store_name": "s"}))
            .unwrap_err();
        assert_eq!(neither.kind(), ErrorKind::Validation);

        let missing_store = session
            .add_users_to_store(&json!({"store_name": "ghost", "user_email": "a@x.com"}))
            .unwrap_err();
        assert_eq!(missing_store.kind(), ErrorKind::NotFound);
    }
}
