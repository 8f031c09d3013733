//! File-backed journal recovery.

use peoplecount_core::{
    normalize, CollectionKind, Config, CoreError, Database, ErrorKind, Principal, Store, User,
};
use peoplecount_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use serde_json::json;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

fn journal(dir: &Path) -> std::path::PathBuf {
    dir.join("journal.log")
}

fn build(dir: &Path) {
    let db = Database::open(dir).unwrap();
    let session = db.session(Principal::admin("tests")).unwrap();
    session
        .create_user(&json!({"email": "a@x.com", "password": "Secret123"}))
        .unwrap();
    session
        .create_store(&json!({"name": "main", "users": ["a@x.com"]}))
        .unwrap();
    session
        .update_store(&json!({"name": "main", "new_name": "central"}))
        .unwrap();
    db.close().unwrap();
}

#[test]
fn reopen_replays_links_and_renames() {
    let dir = tempdir().unwrap();
    build(dir.path());

    let db = Database::open(dir.path()).unwrap();
    let store = db.repository().fetch::<Store>(&normalize("central")).unwrap();
    assert!(store.users.contains(&normalize("a@x.com")));
    assert!(!db.repository().contains(CollectionKind::Store, &normalize("main")));
    assert!(db.verify().unwrap().is_ok());
}

#[test]
fn torn_tail_is_discarded() {
    let dir = tempdir().unwrap();
    build(dir.path());
    let intact = fs::metadata(journal(dir.path())).unwrap().len();

    let mut file = OpenOptions::new()
        .append(true)
        .open(journal(dir.path()))
        .unwrap();
    file.write_all(b"PCJR\x01").unwrap();
    drop(file);

    {
        let db = Database::open(dir.path()).unwrap();
        assert_eq!(db.repository().journal_size().unwrap(), intact);
        assert!(db.verify().unwrap().is_ok());

        db.session(Principal::admin("tests"))
            .unwrap()
            .create_store(&json!({"name": "after"}))
            .unwrap();
    }

    let db = Database::open(dir.path()).unwrap();
    assert_eq!(db.repository().len(CollectionKind::Store), 2);
}

#[test]
fn cut_off_last_record_loses_only_that_write() {
    let dir = tempdir().unwrap();
    {
        let db = Database::open(dir.path()).unwrap();
        let session = db.session(Principal::admin("tests")).unwrap();
        session.create_store(&json!({"name": "first"})).unwrap();
        session.create_store(&json!({"name": "second"})).unwrap();
    }

    let path = journal(dir.path());
    let len = fs::metadata(&path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(len - 3)
        .unwrap();

    let db = Database::open(dir.path()).unwrap();
    assert!(db.repository().contains(CollectionKind::Store, &normalize("first")));
    assert!(!db.repository().contains(CollectionKind::Store, &normalize("second")));
}

#[test]
fn damage_before_the_tail_is_an_error() {
    let dir = tempdir().unwrap();
    build(dir.path());

    let path = journal(dir.path());
    let mut bytes = fs::read(&path).unwrap();
    bytes[12] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    assert!(matches!(
        Database::open(dir.path()),
        Err(CoreError::JournalCorruption { offset: 0, .. })
    ));
}

#[test]
fn missing_directory_without_create_fails() {
    let dir = tempdir().unwrap();
    let result = Database::open_with_config(
        &dir.path().join("absent"),
        Config::new().create_if_missing(false),
    );
    assert!(result.is_err());
}

#[test]
fn compaction_preserves_state() {
    let dir = tempdir().unwrap();
    build(dir.path());

    {
        let db = Database::open(dir.path()).unwrap();
        let before = db.repository().journal_size().unwrap();
        db.compact().unwrap();
        assert!(db.repository().journal_size().unwrap() < before);
    }

    let db = Database::open(dir.path()).unwrap();
    let store = db.repository().fetch::<Store>(&normalize("central")).unwrap();
    assert!(store.users.contains(&normalize("a@x.com")));
    assert!(db.verify().unwrap().is_ok());
}

/// In-memory backend whose appends can be made to fail once.
#[derive(Clone, Default)]
struct FaultyBackend {
    inner: InMemoryBackend,
    appends: Arc<AtomicUsize>,
    fail_on: Arc<AtomicUsize>,
}

impl FaultyBackend {
    /// Fails the `nth` append from now (1 is the next one), once.
    fn fail_append(&self, nth: usize) {
        let next = self.appends.load(Ordering::SeqCst) + nth;
        self.fail_on.store(next, Ordering::SeqCst);
    }
}

impl StorageBackend for FaultyBackend {
    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let n = self.appends.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .fail_on
            .compare_exchange(n, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return Err(StorageError::Io(io::Error::other("injected append failure")));
        }
        self.inner.append(data)
    }

    fn read_all(&self) -> StorageResult<Vec<u8>> {
        self.inner.read_all()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.inner.replace(data)
    }
}

/// Store "old" linked to users a and b, over a backend that can fail.
fn faulty_linked() -> (Database, FaultyBackend) {
    let backend = FaultyBackend::default();
    let db = Database::open_with_backend(Config::new(), Box::new(backend.clone())).unwrap();
    let session = db.session(Principal::admin("tests")).unwrap();
    for email in ["a@x.com", "b@x.com"] {
        session
            .create_user(&json!({"email": email, "password": "Secret123"}))
            .unwrap();
    }
    session
        .create_store(&json!({"name": "old", "users": ["a@x.com", "b@x.com"]}))
        .unwrap();
    drop(session);
    (db, backend)
}

fn user_stores(db: &Database, email: &str) -> Vec<String> {
    db.repository()
        .fetch::<User>(&normalize(email))
        .unwrap()
        .stores
        .iter()
        .map(|key| key.as_str().to_owned())
        .collect()
}

#[test]
fn failed_rename_keeps_old_key_and_reverts_peers() {
    // Appends: user a, user b, rekey. Each step failing must leave the
    // store under its old key.
    for nth in 1..=3 {
        let (db, backend) = faulty_linked();
        let session = db.session(Principal::admin("tests")).unwrap();

        backend.fail_append(nth);
        let err = session
            .update_store(&json!({"name": "old", "new_name": "new"}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal, "append {nth}");

        assert!(db.repository().contains(CollectionKind::Store, &normalize("old")));
        assert!(!db.repository().contains(CollectionKind::Store, &normalize("new")));
        assert_eq!(user_stores(&db, "a@x.com"), ["OLD"]);
        assert_eq!(user_stores(&db, "b@x.com"), ["OLD"]);
        let report = db.verify().unwrap();
        assert!(report.is_ok(), "append {nth}: {:?}", report.violations);

        let replayed = Database::open_with_backend(
            Config::new(),
            Box::new(InMemoryBackend::with_data(backend.inner.snapshot())),
        )
        .unwrap();
        assert!(replayed.repository().contains(CollectionKind::Store, &normalize("old")));
        assert!(replayed.verify().unwrap().is_ok());

        session
            .update_store(&json!({"name": "old", "new_name": "new"}))
            .unwrap();
        assert_eq!(user_stores(&db, "a@x.com"), ["NEW"]);
        assert!(db.verify().unwrap().is_ok());
    }
}

#[test]
fn delete_interrupted_mid_strip_completes_on_retry() {
    let (db, backend) = faulty_linked();
    let session = db.session(Principal::admin("tests")).unwrap();
    let body = json!({"name": "old", "force": true});

    // The first user is stripped, the second write fails.
    backend.fail_append(2);
    let err = session.delete_stores(&body).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(db.repository().contains(CollectionKind::Store, &normalize("old")));

    let report = session.delete_stores(&body).unwrap();
    assert_eq!(report.deleted, [normalize("old")]);
    assert!(!db.repository().contains(CollectionKind::Store, &normalize("old")));
    assert!(user_stores(&db, "a@x.com").is_empty());
    assert!(user_stores(&db, "b@x.com").is_empty());
    assert!(db.verify().unwrap().is_ok());
}

#[test]
fn link_interrupted_between_sides_converges_on_retry() {
    let (db, backend) = faulty_linked();
    let session = db.session(Principal::admin("tests")).unwrap();
    session
        .create_user(&json!({"email": "c@x.com", "password": "Secret123"}))
        .unwrap();
    let body = json!({"store_name": "old", "user_email": "c@x.com"});

    // The store side is written, the user side fails.
    backend.fail_append(2);
    let err = session.add_users_to_store(&body).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    let store = db.repository().fetch::<Store>(&normalize("old")).unwrap();
    assert!(store.users.contains(&normalize("c@x.com")));
    assert!(user_stores(&db, "c@x.com").is_empty());

    let report = session.add_users_to_store(&body).unwrap();
    assert_eq!(report.linked, [normalize("c@x.com")]);
    assert!(report.already_linked.is_empty());
    assert_eq!(user_stores(&db, "c@x.com"), ["OLD"]);
    assert!(db.verify().unwrap().is_ok());
}
