//! Core type definitions for PeopleCount.

use crate::error::{CoreError, CoreResult};
use crate::key::NormalizedKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-document version used for compare-and-set writes.
///
/// Versions start at 1 when a document is created and grow by one with
/// every write to that document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    /// Version of a freshly created document.
    pub const INITIAL: Self = Self(1);

    /// Creates a version from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next version.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// One of the three logical collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Stores, keyed by name.
    Store,
    /// Users, keyed by email.
    User,
    /// Cameras, keyed by URL.
    Camera,
}

impl CollectionKind {
    /// Every collection, in journal order.
    pub const ALL: [Self; 3] = [Self::Store, Self::User, Self::Camera];

    /// Name of the field holding the natural key.
    #[must_use]
    pub const fn key_field(self) -> &'static str {
        match self {
            Self::Store => "name",
            Self::User => "email",
            Self::Camera => "url",
        }
    }

    /// Collections whose documents can reference this one.
    #[must_use]
    pub const fn peers(self) -> &'static [Self] {
        match self {
            Self::Store => &[Self::User, Self::Camera],
            Self::User | Self::Camera => &[Self::Store],
        }
    }

    /// Name of the relationship set in this collection that points at `peer`.
    #[must_use]
    pub const fn link_field(self, peer: Self) -> Option<&'static str> {
        match (self, peer) {
            (Self::Store, Self::User) => Some("users"),
            (Self::Store, Self::Camera) => Some("cameras"),
            (Self::User | Self::Camera, Self::Store) => Some("stores"),
            _ => None,
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Store => 0,
            Self::User => 1,
            Self::Camera => 2,
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Store => "stores",
            Self::User => "users",
            Self::Camera => "cameras",
        })
    }
}

/// A relation between two collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `Store.users` ⇔ `User.stores`.
    StoreUser,
    /// `Store.cameras` ⇔ `Camera.stores`.
    StoreCamera,
}

impl Relation {
    /// Returns the relation connecting `a` and `b`, in either order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` when the two collections are not related.
    pub fn between(a: CollectionKind, b: CollectionKind) -> CoreResult<Self> {
        match (a, b) {
            (CollectionKind::Store, CollectionKind::User)
            | (CollectionKind::User, CollectionKind::Store) => Ok(Self::StoreUser),
            (CollectionKind::Store, CollectionKind::Camera)
            | (CollectionKind::Camera, CollectionKind::Store) => Ok(Self::StoreCamera),
            _ => Err(CoreError::invalid_operation(format!(
                "{a} and {b} are not related"
            ))),
        }
    }
}

/// A document address: collection plus normalized key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// The collection.
    pub kind: CollectionKind,
    /// The normalized key inside the collection.
    pub key: NormalizedKey,
}

impl EntityRef {
    /// Creates a reference.
    #[must_use]
    pub fn new(kind: CollectionKind, key: NormalizedKey) -> Self {
        Self { kind, key }
    }

    /// Reference to a store.
    #[must_use]
    pub fn store(key: NormalizedKey) -> Self {
        Self::new(CollectionKind::Store, key)
    }

    /// Reference to a user.
    #[must_use]
    pub fn user(key: NormalizedKey) -> Self {
        Self::new(CollectionKind::User, key)
    }

    /// Reference to a camera.
    #[must_use]
    pub fn camera(key: NormalizedKey) -> Self {
        Self::new(CollectionKind::Camera, key)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.key)
    }
}
