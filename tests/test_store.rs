mod common;

use vost::*;

// ---------------------------------------------------------------------------
// open / create
// ---------------------------------------------------------------------------

#[test]
fn open_missing_without_create_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = Store::open(dir.path().join("absent.git"), OpenOptions::default());
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn create_initializes_default_branch() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(
        dir.path().join("store.git"),
        OpenOptions {
            create: true,
            ..Default::default()
        },
    )
    .unwrap();

    let snap = store.branches().get("main").unwrap();
    assert_eq!(snap.message().unwrap(), "Initialize main");
    assert!(snap.ls("").unwrap().is_empty());
    assert_eq!(store.branches().default().unwrap(), Some("main".into()));
    assert_eq!(store.branches().reflog("main").unwrap().len(), 1);
}

#[test]
fn create_with_named_branch() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "trunk");
    assert!(store.branches().has("trunk").unwrap());
    assert!(!store.branches().has("main").unwrap());
    assert_eq!(store.branches().default().unwrap(), Some("trunk".into()));
}

#[test]
fn reopen_existing_store() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = common::create_store(dir.path(), "main");
        let snap = store.branches().get("main").unwrap();
        snap.write("persisted.txt", b"still here", Default::default())
            .unwrap();
    }

    let store = Store::open(dir.path().join("store.git"), OpenOptions::default()).unwrap();
    let snap = store.branches().get("main").unwrap();
    assert_eq!(snap.read_text("persisted.txt").unwrap(), "still here");
}

#[test]
fn custom_identity_is_used_for_commits() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(
        dir.path().join("store.git"),
        OpenOptions {
            create: true,
            author: Some("Test Author".into()),
            email: Some("test@example.com".into()),
            ..Default::default()
        },
    )
    .unwrap();
    let snap = store.branches().get("main").unwrap();
    let snap = snap.write("f", b"x", Default::default()).unwrap();
    assert_eq!(snap.author_name().unwrap(), "Test Author");
    assert_eq!(snap.author_email().unwrap(), "test@example.com");
}

// ---------------------------------------------------------------------------
// snapshot / resolve
// ---------------------------------------------------------------------------

#[test]
fn snapshot_by_hash_is_detached() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    let detached = store.snapshot(&snap.commit_hash()).unwrap();
    assert_eq!(detached.commit_hash(), snap.commit_hash());
    assert!(!detached.writable());
    assert_eq!(detached.ref_name(), None);
    assert_eq!(detached.read_text("hello.txt").unwrap(), "hello");
}

#[test]
fn snapshot_validates_hash() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = common::store_with_files(dir.path());
    assert!(matches!(
        store.snapshot("not-a-hash"),
        Err(Error::InvalidHash(_))
    ));
    assert!(matches!(
        store.snapshot("0123456789abcdef0123456789abcdef01234567"),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn resolve_names_and_short_hashes() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    store.tags().create("v1", &snap).unwrap();

    assert_eq!(store.resolve("main").unwrap().commit_hash(), snap.commit_hash());
    assert_eq!(store.resolve("v1").unwrap().commit_hash(), snap.commit_hash());
    let short = &snap.commit_hash()[..10];
    assert_eq!(store.resolve(short).unwrap().commit_hash(), snap.commit_hash());
    assert!(store.resolve("nonsense").is_err());
}

// ---------------------------------------------------------------------------
// branches
// ---------------------------------------------------------------------------

#[test]
fn branch_get_missing_is_key_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    assert!(matches!(
        store.branches().get("ghost"),
        Err(Error::KeyNotFound(_))
    ));
    assert!(store.branches().try_get("ghost").unwrap().is_none());
}

#[test]
fn branch_create_and_diverge() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());

    let feature = store.branches().create("feature", &snap).unwrap();
    assert!(feature.writable());
    assert_eq!(feature.commit_hash(), snap.commit_hash());

    let feature = feature
        .write("feature.txt", b"f", Default::default())
        .unwrap();
    assert!(feature.exists("feature.txt").unwrap());
    assert!(!store
        .branches()
        .get("main")
        .unwrap()
        .exists("feature.txt")
        .unwrap());
}

#[test]
fn branch_create_existing_is_key_exists() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    assert!(matches!(
        store.branches().create("main", &snap),
        Err(Error::KeyExists(_))
    ));
}

#[test]
fn branch_names_are_validated() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    assert!(matches!(
        store.branches().create("bad name", &snap),
        Err(Error::InvalidRefName(_))
    ));
    assert!(matches!(
        store.branches().create("locked.lock", &snap),
        Err(Error::InvalidRefName(_))
    ));
}

#[test]
fn branch_list_and_iter_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    store.branches().create("zeta", &snap).unwrap();
    store.branches().create("alpha", &snap).unwrap();

    assert_eq!(
        store.branches().list().unwrap(),
        vec!["alpha", "main", "zeta"]
    );
    let pairs = store.branches().iter().unwrap();
    assert_eq!(pairs.len(), 3);
    assert!(pairs.iter().all(|(_, oid)| oid.len() == 40));
}

#[test]
fn branch_delete_removes_ref_and_reflog() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    store.branches().create("doomed", &snap).unwrap();
    assert!(store.branches().has("doomed").unwrap());

    store.branches().delete("doomed").unwrap();
    assert!(!store.branches().has("doomed").unwrap());
    assert!(matches!(
        store.branches().reflog("doomed"),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        store.branches().delete("doomed"),
        Err(Error::KeyNotFound(_))
    ));
}

#[test]
fn branch_set_target_moves_tip() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    let older = snap.back(1).unwrap();

    store
        .branches()
        .set_target("main", &older.commit_hash())
        .unwrap();
    assert_eq!(
        store.branches().get("main").unwrap().commit_hash(),
        older.commit_hash()
    );

    assert!(matches!(
        store.branches().set_target("main", "zzz"),
        Err(Error::InvalidHash(_))
    ));
    assert!(matches!(
        store
            .branches()
            .set_target("main", "0123456789abcdef0123456789abcdef01234567"),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn set_default_switches_head() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    store.branches().create("other", &snap).unwrap();

    store.branches().set_default("other").unwrap();
    assert_eq!(store.branches().default().unwrap(), Some("other".into()));

    assert!(matches!(
        store.branches().set_default("ghost"),
        Err(Error::KeyNotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// tags
// ---------------------------------------------------------------------------

#[test]
fn tags_are_readonly_pins() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    store.tags().create("v1", &snap).unwrap();

    // The branch moves on; the tag stays.
    snap.write("later.txt", b"l", Default::default()).unwrap();

    let tagged = store.tags().get("v1").unwrap();
    assert_eq!(tagged.commit_hash(), snap.commit_hash());
    assert!(!tagged.writable());
    assert!(!tagged.exists("later.txt").unwrap());
}

#[test]
fn tags_and_branches_are_separate_namespaces() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    store.tags().create("pin", &snap).unwrap();
    assert!(!store.branches().has("pin").unwrap());
    assert_eq!(store.tags().list().unwrap(), vec!["pin"]);
}

// ---------------------------------------------------------------------------
// concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_writers_one_wins() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let stale_count = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..4 {
        let store = store.clone();
        let stale_count = Arc::clone(&stale_count);
        handles.push(std::thread::spawn(move || {
            let snap = store.branches().get("main").unwrap();
            match snap.write(
                &format!("writer-{}.txt", i),
                b"racing",
                Default::default(),
            ) {
                Ok(_) => {}
                Err(Error::StaleSnapshot(_)) => {
                    stale_count.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // Every loser saw StaleSnapshot; every winner landed one commit.
    let tip = store.branches().get("main").unwrap();
    let files = tip.ls("").unwrap();
    let commits = tip.log(Default::default()).unwrap().count();
    assert_eq!(files.len() + stale_count.load(Ordering::SeqCst), 4);
    assert_eq!(commits, 1 + files.len());
}

#[test]
fn contending_writers_all_succeed_with_retry() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");

    let mut handles = Vec::new();
    for i in 0..4 {
        let store = store.clone();
        handles.push(std::thread::spawn(move || {
            retry_write(10, || {
                let snap = store.branches().get("main").unwrap();
                snap.write(&format!("file-{}.txt", i), b"ok", Default::default())
            })
            .unwrap();
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let tip = store.branches().get("main").unwrap();
    assert_eq!(tip.ls("").unwrap().len(), 4);
}
