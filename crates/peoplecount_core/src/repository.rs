//! Entity repository.
//!
//! Three collections of documents keyed by normalized natural key. Every
//! write touches exactly one document, is journaled before the in-memory
//! map changes, and bumps the document's version.
//!
//! Relationship sets are not writable through the public API; the
//! synchronizer edits them through the crate-private, version-checked
//! [`Repository::edit_links`] and [`Repository::rekey`].

use crate::entity::{Document, Entity, Patch};
use crate::error::{CoreError, CoreResult};
use crate::journal::{Journal, JournalRecord};
use crate::key::NormalizedKey;
use crate::types::{CollectionKind, EntityRef, Version};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

/// A document together with its current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// Version of this snapshot.
    pub version: Version,
    /// The document.
    pub document: T,
}

/// A change to one relationship set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LinkEdit {
    Insert(NormalizedKey),
    Remove(NormalizedKey),
    Replace {
        old: NormalizedKey,
        new: NormalizedKey,
    },
    Clear,
}

type Table = RwLock<BTreeMap<NormalizedKey, Versioned<Document>>>;

/// Document store for stores, users and cameras.
#[derive(Debug)]
pub struct Repository {
    tables: [Table; 3],
    journal: Journal,
}

impl Repository {
    /// Opens a repository by replaying `journal`.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal is corrupt or unreadable.
    pub fn open(journal: Journal) -> CoreResult<Self> {
        let repo = Self {
            tables: Default::default(),
            journal,
        };

        let replay = repo.journal.replay()?;
        for record in replay.records {
            repo.apply_replayed(record);
        }
        Ok(repo)
    }

    fn apply_replayed(&self, record: JournalRecord) {
        match record {
            JournalRecord::Put { version, document } => {
                let mut table = self.table(document.kind()).write();
                table.insert(document.key().clone(), Versioned { version, document });
            }
            JournalRecord::Delete { kind, key } => {
                self.table(kind).write().remove(&key);
            }
            JournalRecord::Rekey {
                old_key,
                version,
                document,
            } => {
                let mut table = self.table(document.kind()).write();
                table.remove(&old_key);
                table.insert(document.key().clone(), Versioned { version, document });
            }
        }
    }

    fn table(&self, kind: CollectionKind) -> &Table {
        &self.tables[kind.index()]
    }

    /// Returns the document under `key`, if any.
    #[must_use]
    pub fn find(&self, kind: CollectionKind, key: &NormalizedKey) -> Option<Versioned<Document>> {
        self.table(kind).read().get(key).cloned()
    }

    /// Returns the document under `key`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is none.
    pub fn get(&self, kind: CollectionKind, key: &NormalizedKey) -> CoreResult<Versioned<Document>> {
        self.find(kind, key)
            .ok_or_else(|| CoreError::not_found(kind, key.clone()))
    }

    /// Returns the typed document under `key`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is none.
    pub fn fetch<T: Entity>(&self, key: &NormalizedKey) -> CoreResult<T> {
        let found = self.get(T::KIND, key)?;
        T::from_document(found.document).ok_or_else(|| {
            CoreError::invalid_operation(format!("{} holds a foreign document", T::KIND))
        })
    }

    /// Returns true if `key` exists in the collection.
    #[must_use]
    pub fn contains(&self, kind: CollectionKind, key: &NormalizedKey) -> bool {
        self.table(kind).read().contains_key(key)
    }

    /// Returns every document of the collection in key order.
    #[must_use]
    pub fn list(&self, kind: CollectionKind) -> Vec<Versioned<Document>> {
        self.table(kind).read().values().cloned().collect()
    }

    /// Number of documents in the collection.
    #[must_use]
    pub fn len(&self, kind: CollectionKind) -> usize {
        self.table(kind).read().len()
    }

    /// Documents of `collection` whose links hold `target`.
    #[must_use]
    pub fn referencing(&self, collection: CollectionKind, target: &EntityRef) -> Vec<EntityRef> {
        self.table(collection)
            .read()
            .values()
            .filter(|stored| {
                stored
                    .document
                    .links(target.kind)
                    .is_ok_and(|links| links.contains(&target.key))
            })
            .map(|stored| stored.document.entity_ref())
            .collect()
    }

    /// Returns true if all collections are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        CollectionKind::ALL.iter().all(|&kind| self.len(kind) == 0)
    }

    /// Inserts a new document.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the key is taken, or a validation error if the
    /// key is empty or the document already carries relationships.
    pub fn create(&self, document: Document) -> CoreResult<Versioned<Document>> {
        let kind = document.kind();
        let key = document.key().clone();
        if key.is_empty() {
            return Err(CoreError::validation(kind.key_field(), "must not be empty"));
        }
        if document.edges().next().is_some() {
            return Err(CoreError::invalid_payload(
                "new documents start without relationships",
            ));
        }

        let mut table = self.table(kind).write();
        if table.contains_key(&key) {
            return Err(CoreError::conflict(kind, key));
        }

        let stored = Versioned {
            version: Version::INITIAL,
            document,
        };
        self.journal.append(&JournalRecord::Put {
            version: stored.version,
            document: stored.document.clone(),
        })?;
        table.insert(key.clone(), stored.clone());

        debug!(collection = %kind, key = %key, id = %stored.document.id(), "created");
        Ok(stored)
    }

    /// Applies a field patch.
    ///
    /// An empty or no-op patch returns the document unchanged and writes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the document does not exist, or a validation
    /// error if the patch names a key field, a relationship set or a field
    /// outside the schema.
    pub fn update(
        &self,
        kind: CollectionKind,
        key: &NormalizedKey,
        patch: &Patch,
    ) -> CoreResult<Versioned<Document>> {
        let mut table = self.table(kind).write();
        let current = table
            .get(key)
            .ok_or_else(|| CoreError::not_found(kind, key.clone()))?;

        let mut document = current.document.clone();
        if !patch.apply(&mut document)? {
            return Ok(current.clone());
        }

        let stored = Versioned {
            version: current.version.next(),
            document,
        };
        self.journal.append(&JournalRecord::Put {
            version: stored.version,
            document: stored.document.clone(),
        })?;
        table.insert(key.clone(), stored.clone());

        debug!(collection = %kind, key = %key, version = %stored.version, "updated");
        Ok(stored)
    }

    /// Removes a document.
    ///
    /// This does not touch peers; deleting through the cascade
    /// orchestrator strips inbound references first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the document does not exist.
    pub fn delete(&self, kind: CollectionKind, key: &NormalizedKey) -> CoreResult<()> {
        let mut table = self.table(kind).write();
        if !table.contains_key(key) {
            return Err(CoreError::not_found(kind, key.clone()));
        }

        self.journal.append(&JournalRecord::Delete {
            kind,
            key: key.clone(),
        })?;
        table.remove(key);

        debug!(collection = %kind, key = %key, "deleted");
        Ok(())
    }

    /// Edits one relationship set if the document is still at `expected`.
    ///
    /// Returns false, without writing, when the edit changes nothing.
    pub(crate) fn edit_links(
        &self,
        entity: &EntityRef,
        peer: CollectionKind,
        expected: Version,
        edit: &LinkEdit,
    ) -> CoreResult<bool> {
        let mut table = self.table(entity.kind).write();
        let current = table
            .get(&entity.key)
            .ok_or_else(|| CoreError::not_found(entity.kind, entity.key.clone()))?;
        if current.version != expected {
            return Err(CoreError::ConcurrentModification {
                collection: entity.kind,
                key: entity.key.clone(),
            });
        }

        let mut document = current.document.clone();
        let links = document.links_mut(peer)?;
        let changed = match edit {
            LinkEdit::Insert(key) => links.insert(key.clone()),
            LinkEdit::Remove(key) => links.remove(key),
            LinkEdit::Replace { old, new } => {
                if links.remove(old) {
                    links.insert(new.clone());
                    true
                } else {
                    false
                }
            }
            LinkEdit::Clear => {
                let had_any = !links.is_empty();
                links.clear();
                had_any
            }
        };
        if !changed {
            return Ok(false);
        }

        let version = expected.next();
        self.journal.append(&JournalRecord::Put {
            version,
            document: document.clone(),
        })?;
        table.insert(entity.key.clone(), Versioned { version, document });

        debug!(entity = %entity, peer = %peer, edit = ?edit, %version, "links edited");
        Ok(true)
    }

    /// Moves a document from `old` to `new` within its collection.
    ///
    /// One table lock and one journal record, so the document is never
    /// visible under both keys or under neither.
    pub(crate) fn rekey(
        &self,
        kind: CollectionKind,
        old: &NormalizedKey,
        new: &NormalizedKey,
        expected: Version,
    ) -> CoreResult<Versioned<Document>> {
        let mut table = self.table(kind).write();
        if table.contains_key(new) {
            return Err(CoreError::conflict(kind, new.clone()));
        }
        let current = table
            .get(old)
            .ok_or_else(|| CoreError::not_found(kind, old.clone()))?;
        if current.version != expected {
            return Err(CoreError::ConcurrentModification {
                collection: kind,
                key: old.clone(),
            });
        }

        let mut document = current.document.clone();
        document.set_key(new.clone());
        let stored = Versioned {
            version: expected.next(),
            document,
        };
        self.journal.append(&JournalRecord::Rekey {
            old_key: old.clone(),
            version: stored.version,
            document: stored.document.clone(),
        })?;
        table.remove(old);
        table.insert(new.clone(), stored.clone());

        debug!(collection = %kind, from = %old, to = %new, "rekeyed");
        Ok(stored)
    }

    /// Rewrites the journal as one record per live document.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be rewritten.
    pub fn compact(&self) -> CoreResult<()> {
        let guards: Vec<_> = self.tables.iter().map(|table| table.read()).collect();
        let records: Vec<JournalRecord> = guards
            .iter()
            .flat_map(|table| table.values())
            .map(|stored| JournalRecord::Put {
                version: stored.version,
                document: stored.document.clone(),
            })
            .collect();
        self.journal.rewrite(&records)
    }

    /// Journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn journal_size(&self) -> CoreResult<u64> {
        self.journal.size()
    }

    /// Forces the journal to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.journal.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PasswordHash;
    use crate::entity::{Store, User};
    use crate::error::ErrorKind;
    use crate::key::normalize;
    use peoplecount_storage::InMemoryBackend;

    fn repo_over(backend: InMemoryBackend) -> Repository {
        Repository::open(Journal::new(Box::new(backend), false)).unwrap()
    }

    fn repo() -> Repository {
        repo_over(InMemoryBackend::new())
    }

    fn store(name: &str) -> Document {
        Store::new(normalize(name)).into_document()
    }

    #[test]
    fn create_get_list() {
        let repo = repo();
        repo.create(store("main branch")).unwrap();
        repo.create(store("north")).unwrap();

        let found = repo.get(CollectionKind::Store, &normalize("Main Branch")).unwrap();
        assert_eq!(found.version, Version::INITIAL);
        assert_eq!(found.document.key().as_str(), "MAIN BRANCH");

        let keys: Vec<_> = repo
            .list(CollectionKind::Store)
            .into_iter()
            .map(|v| v.document.key().to_string())
            .collect();
        assert_eq!(keys, ["MAIN BRANCH", "NORTH"]);
        assert_eq!(repo.len(CollectionKind::User), 0);
    }

    #[test]
    fn duplicate_create_conflicts() {
        let repo = repo();
        repo.create(store("main")).unwrap();
        let err = repo.create(store(" MAIN ")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn create_rejects_prelinked_and_empty_keys() {
        let repo = repo();
        let mut linked = Store::new(normalize("s"));
        linked.users.insert(normalize("a@x.com"));
        assert!(repo.create(linked.into_document()).is_err());
        assert!(repo.create(store("  ")).is_err());
        assert!(repo.is_empty());
    }

    #[test]
    fn update_applies_patch_and_bumps_version() {
        let repo = repo();
        repo.create(store("main")).unwrap();
        let key = normalize("main");

        let updated = repo
            .update(CollectionKind::Store, &key, &Patch::new().text("address", "x st"))
            .unwrap();
        assert_eq!(updated.version, Version::new(2));

        let unchanged = repo
            .update(CollectionKind::Store, &key, &Patch::new().text("address", "X ST"))
            .unwrap();
        assert_eq!(unchanged.version, Version::new(2));
    }

    #[test]
    fn update_rejects_relationship_fields() {
        let repo = repo();
        repo.create(store("main")).unwrap();
        let err = repo
            .update(
                CollectionKind::Store,
                &normalize("main"),
                &Patch::new().text("users", "a@x.com"),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn missing_documents_are_not_found() {
        let repo = repo();
        let key = normalize("ghost");
        assert_eq!(
            repo.get(CollectionKind::User, &key).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(repo.delete(CollectionKind::User, &key).is_err());
        assert!(repo
            .update(CollectionKind::User, &key, &Patch::new())
            .is_err());
    }

    #[test]
    fn edit_links_checks_version() {
        let repo = repo();
        repo.create(store("s")).unwrap();
        let entity = EntityRef::store(normalize("s"));
        let edit = LinkEdit::Insert(normalize("a@x.com"));

        assert!(repo
            .edit_links(&entity, CollectionKind::User, Version::INITIAL, &edit)
            .unwrap());
        let stale = repo.edit_links(&entity, CollectionKind::User, Version::INITIAL, &edit);
        assert!(matches!(stale, Err(CoreError::ConcurrentModification { .. })));

        assert!(!repo
            .edit_links(&entity, CollectionKind::User, Version::new(2), &edit)
            .unwrap());
    }

    #[test]
    fn referencing_scans_peer_collection() {
        let repo = repo();
        repo.create(store("a")).unwrap();
        repo.create(store("b")).unwrap();
        let user = EntityRef::user(normalize("u@x.com"));
        repo.edit_links(
            &EntityRef::store(normalize("b")),
            CollectionKind::User,
            Version::INITIAL,
            &LinkEdit::Insert(user.key.clone()),
        )
        .unwrap();

        assert_eq!(
            repo.referencing(CollectionKind::Store, &user),
            vec![EntityRef::store(normalize("b"))]
        );
        assert!(repo.referencing(CollectionKind::Camera, &user).is_empty());
    }

    #[test]
    fn rekey_moves_document() {
        let repo = repo();
        let created = repo.create(store("a")).unwrap();
        repo.create(store("taken")).unwrap();

        let conflict = repo.rekey(CollectionKind::Store, &normalize("a"), &normalize("taken"), Version::INITIAL);
        assert_eq!(conflict.unwrap_err().kind(), ErrorKind::Conflict);

        let moved = repo
            .rekey(CollectionKind::Store, &normalize("a"), &normalize("b"), Version::INITIAL)
            .unwrap();
        assert_eq!(moved.document.id(), created.document.id());
        assert!(!repo.contains(CollectionKind::Store, &normalize("a")));
        assert!(repo.contains(CollectionKind::Store, &normalize("b")));
    }

    #[test]
    fn state_survives_replay() {
        let backend = InMemoryBackend::new();
        {
            let repo = repo_over(backend.clone());
            repo.create(store("a")).unwrap();
            repo.create(store("gone")).unwrap();
            repo.create(
                User::new(normalize("u@x.com"), PasswordHash::from_encoded("h")).into_document(),
            )
            .unwrap();
            repo.edit_links(
                &EntityRef::store(normalize("a")),
                CollectionKind::User,
                Version::INITIAL,
                &LinkEdit::Insert(normalize("u@x.com")),
            )
            .unwrap();
            repo.rekey(CollectionKind::Store, &normalize("a"), &normalize("b"), Version::new(2))
                .unwrap();
            repo.delete(CollectionKind::Store, &normalize("gone")).unwrap();
        }

        let repo = repo_over(InMemoryBackend::with_data(backend.snapshot()));
        let b = repo.get(CollectionKind::Store, &normalize("b")).unwrap();
        assert_eq!(b.version, Version::new(3));
        assert!(b
            .document
            .links(CollectionKind::User)
            .unwrap()
            .contains(&normalize("u@x.com")));
        assert_eq!(repo.len(CollectionKind::Store), 1);
        assert_eq!(repo.len(CollectionKind::User), 1);
    }

    #[test]
    fn compact_keeps_live_documents() {
        let backend = InMemoryBackend::new();
        let repo = repo_over(backend.clone());
        for i in 0..10 {
            repo.create(store(&format!("s{i}"))).unwrap();
        }
        for i in 0..9 {
            repo.delete(CollectionKind::Store, &normalize(&format!("s{i}"))).unwrap();
        }
        let before = repo.journal_size().unwrap();
        repo.compact().unwrap();
        assert!(repo.journal_size().unwrap() < before);

        let reopened = repo_over(InMemoryBackend::with_data(backend.snapshot()));
        assert_eq!(reopened.len(CollectionKind::Store), 1);
        assert!(reopened.contains(CollectionKind::Store, &normalize("s9")));
    }
}
