//! Paired relationship writes.
//!
//! Every edge lives twice: `Store.users` ⇔ `User.stores` and
//! `Store.cameras` ⇔ `Camera.stores`. The synchronizer is the only code
//! that edits either side, and it always edits both.
//!
//! ## Locking
//!
//! Public methods take the key locks they need and then call a
//! `*_locked` variant. The variants assume the caller already holds locks
//! covering every key they touch, which lets the cascade orchestrator and
//! the operations layer compose several edits under one guard.
//!
//! ## Retry safety
//!
//! The two writes of an edge are separate journal records. If a call
//! fails between them, repeating it converges: `link` writes whichever
//! side is missing and `unlink` removes whichever side is present.

use crate::entity::Document;
use crate::error::{CoreError, CoreResult};
use crate::key::NormalizedKey;
use crate::lock::{KeyLockGuard, KeyLockTable};
use crate::repository::{LinkEdit, Repository, Versioned};
use crate::sync::report::{LinkOutcome, LinkReport, UnlinkOutcome, UnlinkReport};
use crate::types::{CollectionKind, EntityRef, Relation};
use std::collections::BTreeSet;
use std::iter;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// How often the peer set of a rename or delete may shift under us before
/// the operation gives up.
const NEIGHBOURHOOD_ATTEMPTS: usize = 8;

/// Keeps mirrored relationship sets consistent.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    repo: Arc<Repository>,
    locks: Arc<KeyLockTable>,
}

impl Synchronizer {
    /// Creates a synchronizer over `repo`, serializing through `locks`.
    #[must_use]
    pub fn new(repo: Arc<Repository>, locks: Arc<KeyLockTable>) -> Self {
        Self { repo, locks }
    }

    /// The underlying repository.
    #[must_use]
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub(crate) fn locks(&self) -> &KeyLockTable {
        &self.locks
    }

    /// Links `owner` and `target`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for unrelated collections, `LockTimeout`
    /// if the keys stay busy, or a storage error. A missing document is
    /// reported as [`LinkOutcome::NotFound`], not as an error.
    pub fn link(&self, owner: &EntityRef, target: &EntityRef) -> CoreResult<LinkOutcome> {
        Relation::between(owner.kind, target.kind)?;
        let _guard = self.locks.acquire([owner.clone(), target.clone()])?;
        self.link_locked(owner, target)
    }

    /// Unlinks `owner` and `target`.
    ///
    /// # Errors
    ///
    /// Same as [`Synchronizer::link`].
    pub fn unlink(&self, owner: &EntityRef, target: &EntityRef) -> CoreResult<UnlinkOutcome> {
        Relation::between(owner.kind, target.kind)?;
        let _guard = self.locks.acquire([owner.clone(), target.clone()])?;
        self.unlink_locked(owner, target)
    }

    /// Links `owner` to each of `targets`, partitioning the outcomes.
    ///
    /// Duplicate targets are processed once.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `owner` does not exist. Missing targets are
    /// reported in the result.
    pub fn link_many(
        &self,
        owner: &EntityRef,
        target_kind: CollectionKind,
        targets: &[NormalizedKey],
    ) -> CoreResult<LinkReport> {
        Relation::between(owner.kind, target_kind)?;
        let _guard = self.locks.acquire(with_targets(owner, target_kind, targets))?;
        self.link_many_locked(owner, target_kind, targets)
    }

    /// Unlinks `owner` from each of `targets`, partitioning the outcomes.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `owner` does not exist.
    pub fn unlink_many(
        &self,
        owner: &EntityRef,
        target_kind: CollectionKind,
        targets: &[NormalizedKey],
    ) -> CoreResult<UnlinkReport> {
        Relation::between(owner.kind, target_kind)?;
        let targets = dedup(targets);
        let _guard = self.locks.acquire(with_targets(owner, target_kind, &targets))?;

        self.repo.get(owner.kind, &owner.key)?;
        let mut report = UnlinkReport::default();
        for key in targets {
            let target = EntityRef::new(target_kind, key);
            let outcome = self.unlink_locked(owner, &target)?;
            report.record(target.key, &outcome);
        }
        Ok(report)
    }

    /// Moves `old` to `new` within `kind`, rewriting every peer that
    /// references `old` first.
    ///
    /// Renaming to the current key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `old` does not exist, `Conflict` if `new` is
    /// taken, and a validation error if `new` is empty. On any error the
    /// entity keeps its old key and rewritten peers are reverted.
    ///
    /// Reverting is best effort. If the storage keeps failing, some peers
    /// may still list `new`, which then dangles until the same rename is
    /// retried; a successful retry rewrites the remaining peers and
    /// converges.
    pub fn rename(
        &self,
        kind: CollectionKind,
        old: &NormalizedKey,
        new: &NormalizedKey,
    ) -> CoreResult<Versioned<Document>> {
        if new.is_empty() {
            return Err(CoreError::validation(kind.key_field(), "new key must not be empty"));
        }
        if old == new {
            return self.repo.get(kind, old);
        }

        let entity = EntityRef::new(kind, old.clone());
        let (_guard, peers) =
            self.lock_neighbourhood(&entity, &[EntityRef::new(kind, new.clone())])?;
        self.rename_locked(&entity, new, &peers)
    }

    /// Removes `entity` from every peer that references it and clears the
    /// entity's own relationship sets.
    ///
    /// Returns the peers that were modified.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` or a storage error. Partial progress is safe
    /// to repeat.
    pub fn unlink_all(&self, entity: &EntityRef) -> CoreResult<Vec<EntityRef>> {
        let (_guard, peers) = self.lock_neighbourhood(entity, &[])?;
        self.unlink_all_locked(entity, &peers)
    }

    pub(crate) fn link_locked(&self, owner: &EntityRef, target: &EntityRef) -> CoreResult<LinkOutcome> {
        let Some(owner_doc) = self.repo.find(owner.kind, &owner.key) else {
            return Ok(LinkOutcome::NotFound(owner.clone()));
        };
        let Some(target_doc) = self.repo.find(target.kind, &target.key) else {
            return Ok(LinkOutcome::NotFound(target.clone()));
        };

        let owner_has = holds(&owner_doc, target)?;
        let target_has = holds(&target_doc, owner)?;
        if owner_has && target_has {
            return Ok(LinkOutcome::AlreadyLinked);
        }
        if owner_has != target_has {
            warn!(owner = %owner, target = %target, "repairing one-sided link");
        }

        if !owner_has {
            self.repo.edit_links(
                owner,
                target.kind,
                owner_doc.version,
                &LinkEdit::Insert(target.key.clone()),
            )?;
        }
        if !target_has {
            self.repo.edit_links(
                target,
                owner.kind,
                target_doc.version,
                &LinkEdit::Insert(owner.key.clone()),
            )?;
        }

        debug!(owner = %owner, target = %target, "linked");
        Ok(LinkOutcome::Linked)
    }

    pub(crate) fn unlink_locked(
        &self,
        owner: &EntityRef,
        target: &EntityRef,
    ) -> CoreResult<UnlinkOutcome> {
        let owner_doc = self.repo.find(owner.kind, &owner.key);
        let target_doc = self.repo.find(target.kind, &target.key);

        let mut removed = false;
        if let Some(stored) = &owner_doc {
            removed |= self.repo.edit_links(
                owner,
                target.kind,
                stored.version,
                &LinkEdit::Remove(target.key.clone()),
            )?;
        }
        if let Some(stored) = &target_doc {
            removed |= self.repo.edit_links(
                target,
                owner.kind,
                stored.version,
                &LinkEdit::Remove(owner.key.clone()),
            )?;
        }

        let missing = match (&owner_doc, &target_doc) {
            (None, _) => Some(owner),
            (_, None) => Some(target),
            _ => None,
        };
        if let Some(missing) = missing {
            if removed {
                warn!(owner = %owner, target = %target, "removed dangling reference");
            }
            return Ok(UnlinkOutcome::NotFound(missing.clone()));
        }

        if removed {
            debug!(owner = %owner, target = %target, "unlinked");
            Ok(UnlinkOutcome::Unlinked)
        } else {
            Ok(UnlinkOutcome::AlreadyUnlinked)
        }
    }

    pub(crate) fn link_many_locked(
        &self,
        owner: &EntityRef,
        target_kind: CollectionKind,
        targets: &[NormalizedKey],
    ) -> CoreResult<LinkReport> {
        self.repo.get(owner.kind, &owner.key)?;
        let mut report = LinkReport::default();
        for key in dedup(targets) {
            let target = EntityRef::new(target_kind, key);
            let outcome = self.link_locked(owner, &target)?;
            report.record(target.key, &outcome);
        }
        Ok(report)
    }

    pub(crate) fn rename_locked(
        &self,
        entity: &EntityRef,
        new: &NormalizedKey,
        peers: &BTreeSet<EntityRef>,
    ) -> CoreResult<Versioned<Document>> {
        let current = self.repo.get(entity.kind, &entity.key)?;
        if self.repo.contains(entity.kind, new) {
            return Err(CoreError::conflict(entity.kind, new.clone()));
        }

        let replace = LinkEdit::Replace {
            old: entity.key.clone(),
            new: new.clone(),
        };
        let mut rewritten = Vec::new();
        for peer in peers {
            let Some(stored) = self.repo.find(peer.kind, &peer.key) else {
                continue;
            };
            if !holds(&stored, entity).unwrap_or(false) {
                continue;
            }
            if let Err(err) = self.repo.edit_links(peer, entity.kind, stored.version, &replace) {
                self.revert_rename(entity, new, &rewritten);
                return Err(err);
            }
            rewritten.push(peer.clone());
        }

        match self.repo.rekey(entity.kind, &entity.key, new, current.version) {
            Ok(stored) => {
                info!(
                    collection = %entity.kind,
                    from = %entity.key,
                    to = %new,
                    peers = rewritten.len(),
                    "renamed"
                );
                Ok(stored)
            }
            Err(err) => {
                self.revert_rename(entity, new, &rewritten);
                Err(err)
            }
        }
    }

    fn revert_rename(&self, entity: &EntityRef, new: &NormalizedKey, rewritten: &[EntityRef]) {
        let undo = LinkEdit::Replace {
            old: new.clone(),
            new: entity.key.clone(),
        };
        for peer in rewritten {
            let result = self
                .repo
                .get(peer.kind, &peer.key)
                .and_then(|stored| self.repo.edit_links(peer, entity.kind, stored.version, &undo));
            match result {
                Ok(_) => warn!(entity = %entity, peer = %peer, "rename reverted on peer"),
                Err(err) => {
                    warn!(entity = %entity, peer = %peer, error = %err, "could not revert rename on peer");
                }
            }
        }
    }

    pub(crate) fn unlink_all_locked(
        &self,
        entity: &EntityRef,
        peers: &BTreeSet<EntityRef>,
    ) -> CoreResult<Vec<EntityRef>> {
        let remove = LinkEdit::Remove(entity.key.clone());
        let mut modified = Vec::new();
        for peer in peers {
            let Some(stored) = self.repo.find(peer.kind, &peer.key) else {
                continue;
            };
            if self.repo.edit_links(peer, entity.kind, stored.version, &remove)? {
                debug!(entity = %entity, peer = %peer, "reference stripped");
                modified.push(peer.clone());
            }
        }

        for &peer_kind in entity.kind.peers() {
            if let Some(stored) = self.repo.find(entity.kind, &entity.key) {
                self.repo
                    .edit_links(entity, peer_kind, stored.version, &LinkEdit::Clear)?;
            }
        }
        Ok(modified)
    }

    /// Locks `entity`, `extra` and every document linked to `entity` from
    /// either side.
    ///
    /// The peer set is read before locking and again after; if it grew in
    /// between, the locks are dropped and the whole set is taken again.
    pub(crate) fn lock_neighbourhood(
        &self,
        entity: &EntityRef,
        extra: &[EntityRef],
    ) -> CoreResult<(KeyLockGuard<'_>, BTreeSet<EntityRef>)> {
        for attempt in 1..=NEIGHBOURHOOD_ATTEMPTS {
            let peers = self.referencing_peers(entity);
            let keys = iter::once(entity.clone())
                .chain(extra.iter().cloned())
                .chain(peers);
            let guard = self.locks.acquire(keys)?;

            let settled = self.referencing_peers(entity);
            if settled.iter().all(|peer| guard.covers(peer)) {
                return Ok((guard, settled));
            }
            trace!(entity = %entity, attempt, "peer set moved while locking");
        }
        Err(CoreError::ConcurrentModification {
            collection: entity.kind,
            key: entity.key.clone(),
        })
    }

    /// Peers `entity` lists plus peers listing `entity`.
    pub(crate) fn referencing_peers(&self, entity: &EntityRef) -> BTreeSet<EntityRef> {
        let mut peers: BTreeSet<EntityRef> = self
            .repo
            .find(entity.kind, &entity.key)
            .map(|stored| stored.document.edges().collect())
            .unwrap_or_default();
        for &peer in entity.kind.peers() {
            peers.extend(self.repo.referencing(peer, entity));
        }
        peers
    }
}

fn holds(stored: &Versioned<Document>, other: &EntityRef) -> CoreResult<bool> {
    Ok(stored.document.links(other.kind)?.contains(&other.key))
}

fn dedup(keys: &[NormalizedKey]) -> Vec<NormalizedKey> {
    let mut seen = BTreeSet::new();
    keys.iter()
        .filter(|key| seen.insert((*key).clone()))
        .cloned()
        .collect()
}

fn with_targets<'a>(
    owner: &'a EntityRef,
    target_kind: CollectionKind,
    targets: &'a [NormalizedKey],
) -> impl Iterator<Item = EntityRef> + 'a {
    iter::once(owner.clone()).chain(
        targets
            .iter()
            .map(move |key| EntityRef::new(target_kind, key.clone())),
    )
}
