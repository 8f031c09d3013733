//! Compound operations built from synchronizer primitives.
//!
//! Deleting an entity strips it from every peer first and removes the
//! document last. If stripping fails partway the entity stays, and the
//! delete can simply be repeated.

use crate::entity::Document;
use crate::error::{CoreError, CoreResult};
use crate::key::NormalizedKey;
use crate::repository::Versioned;
use crate::sync::Synchronizer;
use crate::types::{CollectionKind, EntityRef};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

/// Outcome of deleting one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    /// The deleted key.
    pub key: NormalizedKey,
    /// Peers whose relationship sets were rewritten.
    pub peers_updated: Vec<EntityRef>,
}

/// Outcome of deleting several entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteManyReport {
    /// Keys that were deleted.
    pub deleted: Vec<NormalizedKey>,
    /// Keys that did not exist.
    pub not_found: Vec<NormalizedKey>,
    /// Peers rewritten across all deletions.
    pub peers_updated: Vec<EntityRef>,
}

/// Sequences synchronizer calls for delete and rename.
#[derive(Debug, Clone)]
pub struct CascadeOrchestrator {
    sync: Synchronizer,
}

impl CascadeOrchestrator {
    /// Creates an orchestrator driving `sync`.
    #[must_use]
    pub fn new(sync: Synchronizer) -> Self {
        Self { sync }
    }

    /// Deletes `entity` after removing every reference to it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the entity does not exist, `LockTimeout` if
    /// its neighbourhood stays busy, or a storage error.
    pub fn delete_entity(&self, entity: &EntityRef) -> CoreResult<DeleteReport> {
        let repo = self.sync.repository();
        if !repo.contains(entity.kind, &entity.key) {
            return Err(CoreError::not_found(entity.kind, entity.key.clone()));
        }

        let (_guard, peers) = self.sync.lock_neighbourhood(entity, &[])?;
        repo.get(entity.kind, &entity.key)?;
        let peers_updated = self.sync.unlink_all_locked(entity, &peers)?;
        repo.delete(entity.kind, &entity.key)?;

        info!(
            collection = %entity.kind,
            key = %entity.key,
            peers = peers_updated.len(),
            "deleted"
        );
        Ok(DeleteReport {
            key: entity.key.clone(),
            peers_updated,
        })
    }

    /// Deletes each of `keys` independently.
    ///
    /// Missing keys are reported, not raised. Duplicates are processed
    /// once.
    ///
    /// # Errors
    ///
    /// Returns `NoneFound` if no key exists, or the first error other
    /// than `NotFound`. Deletions completed before such an error stand.
    pub fn delete_many(
        &self,
        kind: CollectionKind,
        keys: &[NormalizedKey],
    ) -> CoreResult<DeleteManyReport> {
        let mut report = DeleteManyReport::default();
        let mut seen = BTreeSet::new();
        let mut peers = BTreeSet::new();

        for key in keys {
            if !seen.insert(key.clone()) {
                continue;
            }
            match self.delete_entity(&EntityRef::new(kind, key.clone())) {
                Ok(deleted) => {
                    peers.extend(deleted.peers_updated);
                    report.deleted.push(deleted.key);
                }
                Err(CoreError::NotFound { .. }) => report.not_found.push(key.clone()),
                Err(err) => return Err(err),
            }
        }

        if report.deleted.is_empty() && !report.not_found.is_empty() {
            return Err(CoreError::NoneFound {
                collection: kind,
                keys: report.not_found,
            });
        }
        // Peers deleted later in the same batch are gone.
        report.peers_updated = peers
            .into_iter()
            .filter(|peer| self.sync.repository().contains(peer.kind, &peer.key))
            .collect();
        Ok(report)
    }

    /// Renames an entity, propagating the new key to its peers.
    ///
    /// # Errors
    ///
    /// See [`Synchronizer::rename`].
    pub fn rename_entity(
        &self,
        kind: CollectionKind,
        old: &NormalizedKey,
        new: &NormalizedKey,
    ) -> CoreResult<Versioned<Document>> {
        self.sync.rename(kind, old, new)
    }

    /// The synchronizer this orchestrator drives.
    #[must_use]
    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PasswordHash;
    use crate::entity::{Camera, Entity, Store, User, VerbatimCredential};
    use crate::error::ErrorKind;
    use crate::journal::Journal;
    use crate::key::normalize;
    use crate::lock::KeyLockTable;
    use crate::repository::Repository;
    use peoplecount_storage::InMemoryBackend;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        cascade: CascadeOrchestrator,
        store: EntityRef,
        user: EntityRef,
        camera: EntityRef,
    }

    fn fixture() -> Fixture {
        let journal = Journal::new(Box::new(InMemoryBackend::new()), false);
        let repo = Arc::new(Repository::open(journal).unwrap());
        let sync = Synchronizer::new(Arc::clone(&repo), Arc::new(KeyLockTable::new(Duration::from_millis(200))));

        let store = repo.create(Store::new(normalize("s")).into_document()).unwrap();
        let user = repo
            .create(User::new(normalize("u@x.com"), PasswordHash::from_encoded("h")).into_document())
            .unwrap();
        let camera = repo
            .create(
                Camera::new(normalize("http://cam:80"), "a".into(), VerbatimCredential::new("p"))
                    .into_document(),
            )
            .unwrap();

        let fixture = Fixture {
            cascade: CascadeOrchestrator::new(sync),
            store: store.document.entity_ref(),
            user: user.document.entity_ref(),
            camera: camera.document.entity_ref(),
        };
        let sync = fixture.cascade.synchronizer();
        sync.link(&fixture.store, &fixture.user).unwrap();
        sync.link(&fixture.camera, &fixture.store).unwrap();
        fixture
    }

    fn stores_of(f: &Fixture, entity: &EntityRef) -> usize {
        f.cascade
            .synchronizer()
            .repository()
            .get(entity.kind, &entity.key)
            .unwrap()
            .document
            .links(CollectionKind::Store)
            .unwrap()
            .len()
    }

    #[test]
    fn delete_strips_every_peer() {
        let f = fixture();
        let report = f.cascade.delete_entity(&f.store).unwrap();

        assert_eq!(report.peers_updated.len(), 2);
        assert_eq!(stores_of(&f, &f.user), 0);
        assert_eq!(stores_of(&f, &f.camera), 0);
        assert!(!f
            .cascade
            .synchronizer()
            .repository()
            .contains(CollectionKind::Store, &f.store.key));
    }

    #[test]
    fn delete_missing_is_not_found() {
        let f = fixture();
        let err = f
            .cascade
            .delete_entity(&EntityRef::store(normalize("ghost")))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn delete_user_updates_store() {
        let f = fixture();
        f.cascade.delete_entity(&f.user).unwrap();
        let store = f
            .cascade
            .synchronizer()
            .repository()
            .get(CollectionKind::Store, &f.store.key)
            .unwrap();
        assert!(store.document.links(CollectionKind::User).unwrap().is_empty());
        assert_eq!(store.document.links(CollectionKind::Camera).unwrap().len(), 1);
    }

    #[test]
    fn delete_many_reports_per_key() {
        let f = fixture();
        let report = f
            .cascade
            .delete_many(
                CollectionKind::Store,
                &[normalize("s"), normalize("ghost"), normalize("S")],
            )
            .unwrap();
        assert_eq!(report.deleted, [normalize("s")]);
        assert_eq!(report.not_found, [normalize("ghost")]);
        assert_eq!(report.peers_updated.len(), 2);
    }

    #[test]
    fn delete_many_with_nothing_found_fails() {
        let f = fixture();
        let err = f
            .cascade
            .delete_many(CollectionKind::User, &[normalize("a@x.com"), normalize("b@x.com")])
            .unwrap_err();
        assert!(matches!(err, CoreError::NoneFound { ref keys, .. } if keys.len() == 2));
    }

    #[test]
    fn rename_entity_delegates() {
        let f = fixture();
        f.cascade
            .rename_entity(CollectionKind::Camera, &f.camera.key, &normalize("http://cam:81"))
            .unwrap();
        let store = f
            .cascade
            .synchronizer()
            .repository()
            .get(CollectionKind::Store, &f.store.key)
            .unwrap();
        assert!(store
            .document
            .links(CollectionKind::Camera)
            .unwrap()
            .contains(&normalize("HTTP://CAM:81")));
    }
}
