//! Store, User and Camera documents.

use crate::auth::PasswordHash;
use crate::entity::EntityId;
use crate::error::{CoreError, CoreResult};
use crate::key::{KeySet, NormalizedKey};
use crate::types::{CollectionKind, EntityRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A camera credential stored exactly as supplied.
///
/// Camera passwords are handed to the camera integration as-is, so they
/// cannot be hashed. This type keeps them apart from [`PasswordHash`]:
/// `Debug` is redacted and no view ever includes it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerbatimCredential(String);

impl VerbatimCredential {
    /// Wraps a credential.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the credential for handing to the camera.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VerbatimCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VerbatimCredential(<redacted>)")
    }
}

/// A store document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    /// Stable identifier.
    pub id: EntityId,
    /// Unique key.
    pub name: NormalizedKey,
    /// Owning client, normalized; empty when unset.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Postal address, normalized; empty when unset.
    pub address: String,
    /// Linked users.
    pub users: KeySet,
    /// Linked cameras.
    pub cameras: KeySet,
}

impl Store {
    /// Creates a store with no links.
    #[must_use]
    pub fn new(name: NormalizedKey) -> Self {
        Self {
            id: EntityId::new(),
            name,
            client_id: String::new(),
            address: String::new(),
            users: KeySet::new(),
            cameras: KeySet::new(),
        }
    }
}

/// A user document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier.
    pub id: EntityId,
    /// Unique key.
    pub email: NormalizedKey,
    /// Login password hash.
    #[serde(rename = "passwordHash")]
    pub password_hash: PasswordHash,
    /// Owning client, normalized.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Display name, normalized.
    pub name: String,
    /// Phone number, normalized.
    pub tel: String,
    /// Postal address, normalized.
    pub address: String,
    /// Linked stores.
    pub stores: KeySet,
}

impl User {
    /// Creates a user with no links.
    #[must_use]
    pub fn new(email: NormalizedKey, password_hash: PasswordHash) -> Self {
        Self {
            id: EntityId::new(),
            email,
            password_hash,
            client_id: String::new(),
            name: String::new(),
            tel: String::new(),
            address: String::new(),
            stores: KeySet::new(),
        }
    }
}

/// A camera document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Camera {
    /// Stable identifier.
    pub id: EntityId,
    /// Unique key.
    pub url: NormalizedKey,
    /// Login name for the camera, stored as supplied.
    pub username: String,
    /// Login password for the camera.
    pub password: VerbatimCredential,
    /// Display name, normalized.
    pub name: String,
    /// Linked stores.
    pub stores: KeySet,
}

impl Camera {
    /// Creates a camera with no links.
    #[must_use]
    pub fn new(url: NormalizedKey, username: String, password: VerbatimCredential) -> Self {
        Self {
            id: EntityId::new(),
            url,
            username,
            password,
            name: String::new(),
            stores: KeySet::new(),
        }
    }
}

/// A typed document living in one collection.
pub trait Entity: Sized {
    /// The collection holding this type.
    const KIND: CollectionKind;

    /// Wraps into a [`Document`].
    fn into_document(self) -> Document;

    /// Unwraps a [`Document`] of the matching kind.
    fn from_document(document: Document) -> Option<Self>;
}

macro_rules! impl_entity {
    ($ty:ident, $kind:ident) => {
        impl Entity for $ty {
            const KIND: CollectionKind = CollectionKind::$kind;

            fn into_document(self) -> Document {
                Document::$kind(self)
            }

            fn from_document(document: Document) -> Option<Self> {
                match document {
                    Document::$kind(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_entity!(Store, Store);
impl_entity!(User, User);
impl_entity!(Camera, Camera);

/// Any document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Document {
    /// A store.
    Store(Store),
    /// A user.
    User(User),
    /// A camera.
    Camera(Camera),
}

impl Document {
    /// The collection this document belongs to.
    #[must_use]
    pub const fn kind(&self) -> CollectionKind {
        match self {
            Self::Store(_) => CollectionKind::Store,
            Self::User(_) => CollectionKind::User,
            Self::Camera(_) => CollectionKind::Camera,
        }
    }

    /// Stable identifier.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        match self {
            Self::Store(s) => s.id,
            Self::User(u) => u.id,
            Self::Camera(c) => c.id,
        }
    }

    /// Natural key.
    #[must_use]
    pub const fn key(&self) -> &NormalizedKey {
        match self {
            Self::Store(s) => &s.name,
            Self::User(u) => &u.email,
            Self::Camera(c) => &c.url,
        }
    }

    /// Address of this document.
    #[must_use]
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.key().clone())
    }

    pub(crate) fn set_key(&mut self, key: NormalizedKey) {
        match self {
            Self::Store(s) => s.name = key,
            Self::User(u) => u.email = key,
            Self::Camera(c) => c.url = key,
        }
    }

    /// The relationship set pointing at `peer`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` when this collection does not relate to
    /// `peer`.
    pub fn links(&self, peer: CollectionKind) -> CoreResult<&KeySet> {
        match (self, peer) {
            (Self::Store(s), CollectionKind::User) => Ok(&s.users),
            (Self::Store(s), CollectionKind::Camera) => Ok(&s.cameras),
            (Self::User(u), CollectionKind::Store) => Ok(&u.stores),
            (Self::Camera(c), CollectionKind::Store) => Ok(&c.stores),
            _ => Err(unrelated(self.kind(), peer)),
        }
    }

    pub(crate) fn links_mut(&mut self, peer: CollectionKind) -> CoreResult<&mut KeySet> {
        let kind = self.kind();
        match (self, peer) {
            (Self::Store(s), CollectionKind::User) => Ok(&mut s.users),
            (Self::Store(s), CollectionKind::Camera) => Ok(&mut s.cameras),
            (Self::User(u), CollectionKind::Store) => Ok(&mut u.stores),
            (Self::Camera(c), CollectionKind::Store) => Ok(&mut c.stores),
            _ => Err(unrelated(kind, peer)),
        }
    }

    /// Every `(peer, key)` edge this document holds.
    pub fn edges(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.kind().peers().iter().flat_map(move |&peer| {
            self.links(peer)
                .into_iter()
                .flat_map(move |set| set.iter().map(move |key| EntityRef::new(peer, key.clone())))
        })
    }
}

fn unrelated(kind: CollectionKind, peer: CollectionKind) -> CoreError {
    CoreError::invalid_operation(format!("{kind} hold no links to {peer}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::normalize;

    fn store() -> Store {
        let mut store = Store::new(normalize("main"));
        store.users.insert(normalize("a@x.com"));
        store.cameras.insert(normalize("http://cam:80"));
        store
    }

    #[test]
    fn entity_round_trip_through_document() {
        let doc = store().into_document();
        assert_eq!(doc.kind(), CollectionKind::Store);
        assert_eq!(doc.key().as_str(), "MAIN");
        assert!(User::from_document(doc.clone()).is_none());
        assert_eq!(Store::from_document(doc).unwrap().name, normalize("main"));
    }

    #[test]
    fn links_follow_relations() {
        let doc = store().into_document();
        assert!(doc.links(CollectionKind::User).unwrap().contains(&normalize("A@X.COM")));
        assert!(doc.links(CollectionKind::Store).is_err());

        let edges: Vec<_> = doc.edges().map(|e| e.to_string()).collect();
        assert_eq!(edges, ["users/A@X.COM", "cameras/HTTP://CAM:80"]);
    }

    #[test]
    fn set_key_keeps_identity() {
        let mut doc = store().into_document();
        let id = doc.id();
        doc.set_key(normalize("renamed"));
        assert_eq!(doc.key().as_str(), "RENAMED");
        assert_eq!(doc.id(), id);
    }

    #[test]
    fn camera_password_is_redacted_in_debug() {
        let camera = Camera::new(
            normalize("http://cam:80"),
            "admin".into(),
            VerbatimCredential::new("hunter2"),
        );
        let debug = format!("{camera:?}");
        assert!(!debug.contains("hunter2"));
        assert_eq!(camera.password.expose(), "hunter2");
    }

    #[test]
    fn store_serializes_client_id_field() {
        let json = serde_json::to_value(store()).unwrap();
        assert_eq!(json["clientID"], "");
        assert_eq!(json["users"][0], "A@X.COM");
    }
}
