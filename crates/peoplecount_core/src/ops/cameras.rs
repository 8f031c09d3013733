//! Camera operations.

use super::{apply_update, downcast, keys, Session, Updated};
use crate::cascade::DeleteManyReport;
use crate::entity::{Camera, CameraView, Entity, Patch, VerbatimCredential};
use crate::error::{CoreError, CoreResult};
use crate::key::{normalize, normalize_text, NormalizedKey};
use crate::repository::Repository;
use crate::sync::{LinkOutcome, UnlinkOutcome};
use crate::types::{CollectionKind, EntityRef};
use crate::validation::{
    allow_only, as_payload, non_blank_str, one_or_many, reject_fields, require_force,
    required_alias, required_str, validate_url, Payload,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

const UPDATE_FIELDS: [&str; 6] = ["url", "current_url", "new_url", "name", "username", "password"];

const STORES_HINT: &str = "stores are linked through addStoreToCamera";

/// Result of `listCameras`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraList {
    /// Every camera, ordered by URL. Passwords are never included.
    pub cameras: Vec<CameraView>,
}

/// State of one camera–store edge after a link operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeState {
    /// The edge was written.
    Linked,
    /// Both sides already held the edge.
    AlreadyLinked,
    /// The edge was removed.
    Unlinked,
    /// Neither side held the edge.
    AlreadyUnlinked,
}

/// Result of `addStoreToCamera` and `removeStoreFromCamera`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeChange {
    /// Camera key.
    pub camera: NormalizedKey,
    /// Store key.
    pub store: NormalizedKey,
    /// What the operation did.
    pub state: EdgeState,
}

impl Session<'_> {
    /// Lists every camera.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after the database was closed.
    pub fn list_cameras(&self) -> CoreResult<CameraList> {
        let cameras = self
            .db()?
            .repository()
            .list(CollectionKind::Camera)
            .into_iter()
            .map(|stored| downcast::<Camera>(stored.document).map(|c| CameraView::from(&c)))
            .collect::<CoreResult<_>>()?;
        Ok(CameraList { cameras })
    }

    /// Creates a camera, linked to `store` when one is given.
    ///
    /// Payload: `{url, username, password, name?, store?}`. The username
    /// and password are trimmed but keep their case.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the URL is taken, `NotFound` if the store does
    /// not exist, and a validation error for a malformed URL, a missing
    /// credential or a `stores` field. Nothing is written on error.
    pub fn create_camera(&self, body: &Value) -> CoreResult<CameraView> {
        let db = self.db()?;
        let payload = as_payload(body)?;
        reject_fields(payload, &["stores"], STORES_HINT)?;

        let url = required_str(payload, "url")?.trim();
        validate_url("url", url)?;
        let username = required_str(payload, "username")?.trim();
        let password = required_str(payload, "password")?.trim();
        let name = non_blank_str(payload, "name")?;
        let store = non_blank_str(payload, "store")?.map(|raw| EntityRef::store(normalize(raw)));

        let mut camera = Camera::new(
            normalize(url),
            username.to_owned(),
            VerbatimCredential::new(password),
        );
        if let Some(name) = name {
            camera.name = normalize_text(name);
        }

        let entity = EntityRef::camera(camera.url.clone());
        let sync = db.synchronizer();
        let repo = db.repository();
        let _guard = sync
            .locks()
            .acquire(std::iter::once(entity.clone()).chain(store.clone()))?;

        if repo.contains(CollectionKind::Camera, &entity.key) {
            return Err(CoreError::conflict(CollectionKind::Camera, entity.key));
        }
        if let Some(store) = &store {
            repo.get(store.kind, &store.key)?;
        }

        repo.create(camera.into_document())?;
        if let Some(store) = &store {
            sync.link_locked(&entity, store)?;
        }
        let camera = repo.fetch::<Camera>(&entity.key)?;

        info!(camera = %entity.key, stores = camera.stores.len(), "camera created");
        Ok(CameraView::from(&camera))
    }

    /// Updates a camera's fields and optionally moves it to a new URL.
    ///
    /// Payload: `{url | current_url, new_url?, name?, username?,
    /// password?}`. At least one field to change must be present. The
    /// password is stored as supplied.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Conflict` if `new_url` is taken, and a
    /// validation error for `stores`, unknown or blank fields, or a
    /// malformed `new_url`.
    pub fn update_camera(&self, body: &Value) -> CoreResult<Updated<CameraView>> {
        let db = self.db()?;
        let payload = as_payload(body)?;
        reject_fields(payload, &["stores"], STORES_HINT)?;
        allow_only(payload, &UPDATE_FIELDS)?;

        let entity = EntityRef::camera(normalize(required_alias(payload, &["current_url", "url"])?));
        let new_url = match non_blank_str(payload, "new_url")? {
            Some(raw) => {
                validate_url("new_url", raw.trim())?;
                Some(normalize(raw))
            }
            None => None,
        };
        let patch = camera_patch(payload)?;
        if patch.is_empty() && new_url.is_none() {
            return Err(CoreError::invalid_payload("no valid fields provided to update"));
        }

        let updated = apply_update(db, &entity, new_url.as_ref(), |_| Ok(patch))?;
        let camera = downcast::<Camera>(updated.document)?;
        if updated.changed {
            info!(camera = %entity.key, now = %camera.url, "camera updated");
        }
        Ok(Updated {
            changed: updated.changed,
            document: CameraView::from(&camera),
        })
    }

    /// Links a store to a camera.
    ///
    /// Payload: `{url, store}`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if either document is missing; nothing is
    /// written in that case.
    pub fn add_store_to_camera(&self, body: &Value) -> CoreResult<EdgeChange> {
        let db = self.db()?;
        let (camera, store) = camera_and_store(as_payload(body)?)?;
        let sync = db.synchronizer();
        let _guard = sync.locks().acquire([camera.clone(), store.clone()])?;
        require_both(db.repository(), &camera, &store)?;

        let state = match sync.link_locked(&camera, &store)? {
            LinkOutcome::Linked => EdgeState::Linked,
            LinkOutcome::AlreadyLinked => EdgeState::AlreadyLinked,
            LinkOutcome::NotFound(missing) => {
                return Err(CoreError::not_found(missing.kind, missing.key))
            }
        };
        Ok(EdgeChange {
            camera: camera.key,
            store: store.key,
            state,
        })
    }

    /// Unlinks a store from a camera.
    ///
    /// # Errors
    ///
    /// Same as [`Session::add_store_to_camera`].
    pub fn remove_store_from_camera(&self, body: &Value) -> CoreResult<EdgeChange> {
        let db = self.db()?;
        let (camera, store) = camera_and_store(as_payload(body)?)?;
        let sync = db.synchronizer();
        let _guard = sync.locks().acquire([camera.clone(), store.clone()])?;
        require_both(db.repository(), &camera, &store)?;

        let state = match sync.unlink_locked(&camera, &store)? {
            UnlinkOutcome::Unlinked => EdgeState::Unlinked,
            UnlinkOutcome::AlreadyUnlinked => EdgeState::AlreadyUnlinked,
            UnlinkOutcome::NotFound(missing) => {
                return Err(CoreError::not_found(missing.kind, missing.key))
            }
        };
        Ok(EdgeChange {
            camera: camera.key,
            store: store.key,
            state,
        })
    }

    /// Deletes cameras after unlinking them from every store.
    ///
    /// Payload: `{url: string | [string], force: true}`.
    ///
    /// # Errors
    ///
    /// Returns a validation error unless `force` is `true`, and
    /// `NoneFound` if no listed camera exists.
    pub fn delete_cameras(&self, body: &Value) -> CoreResult<DeleteManyReport> {
        let db = self.db()?;
        let payload = as_payload(body)?;
        require_force(payload)?;
        let urls = one_or_many(payload, "url")?;
        db.cascade().delete_many(CollectionKind::Camera, &keys(&urls))
    }
}

fn camera_patch(payload: &Payload) -> CoreResult<Patch> {
    let mut patch = Patch::new();
    for field in ["name", "username", "password"] {
        if let Some(value) = non_blank_str(payload, field)? {
            patch = patch.text(field, value);
        }
    }
    Ok(patch)
}

fn camera_and_store(payload: &Payload) -> CoreResult<(EntityRef, EntityRef)> {
    let camera = EntityRef::camera(normalize(required_str(payload, "url")?));
    let store = EntityRef::store(normalize(required_str(payload, "store")?));
    Ok((camera, store))
}

fn require_both(
    repo: &Repository,
    camera: &EntityRef,
    store: &EntityRef,
) -> CoreResult<()> {
    for entity in [camera, store] {
        if !repo.contains(entity.kind, &entity.key) {
            return Err(CoreError::not_found(entity.kind, entity.key.clone()));
        }
    }
    Ok(())
}
