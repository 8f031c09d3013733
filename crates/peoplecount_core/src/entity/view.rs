//! Client-facing projections of documents.
//!
//! Views never carry credentials: neither the user's password hash nor
//! the camera password.

use crate::entity::{Camera, Document, Store, User};
use crate::key::{KeySet, NormalizedKey};
use serde::Serialize;

/// A store as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreView {
    /// Store key.
    pub name: NormalizedKey,
    /// Owning client.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Address.
    pub address: String,
    /// Linked users.
    pub users: KeySet,
    /// Linked cameras.
    pub cameras: KeySet,
}

impl From<&Store> for StoreView {
    fn from(store: &Store) -> Self {
        Self {
            name: store.name.clone(),
            client_id: store.client_id.clone(),
            address: store.address.clone(),
            users: store.users.clone(),
            cameras: store.cameras.clone(),
        }
    }
}

/// A user as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    /// User key.
    pub email: NormalizedKey,
    /// Owning client.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Display name.
    pub name: String,
    /// Phone number.
    pub tel: String,
    /// Address.
    pub address: String,
    /// Linked stores.
    pub stores: KeySet,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            client_id: user.client_id.clone(),
            name: user.name.clone(),
            tel: user.tel.clone(),
            address: user.address.clone(),
            stores: user.stores.clone(),
        }
    }
}

/// A camera as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraView {
    /// Camera key.
    pub url: NormalizedKey,
    /// Login name.
    pub username: String,
    /// Display name.
    pub name: String,
    /// Linked stores.
    pub stores: KeySet,
}

impl From<&Camera> for CameraView {
    fn from(camera: &Camera) -> Self {
        Self {
            url: camera.url.clone(),
            username: camera.username.clone(),
            name: camera.name.clone(),
            stores: camera.stores.clone(),
        }
    }
}

/// A view of any document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DocumentView {
    /// Store view.
    Store(StoreView),
    /// User view.
    User(UserView),
    /// Camera view.
    Camera(CameraView),
}

impl From<&Document> for DocumentView {
    fn from(document: &Document) -> Self {
        match document {
            Document::Store(s) => Self::Store(s.into()),
            Document::User(u) => Self::User(u.into()),
            Document::Camera(c) => Self::Camera(c.into()),
        }
    }
}
