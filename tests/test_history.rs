mod common;

use vost::*;

// ---------------------------------------------------------------------------
// parent / back
// ---------------------------------------------------------------------------

#[test]
fn parent_of_initial_commit_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    assert!(snap.parent().unwrap().is_none());
}

#[test]
fn parent_chain_is_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap.write("a.txt", b"a", Default::default()).unwrap();
    let snap = snap.write("b.txt", b"b", Default::default()).unwrap();

    let parent = snap.parent().unwrap().unwrap();
    assert!(parent.exists("a.txt").unwrap());
    assert!(!parent.exists("b.txt").unwrap());
    assert!(!parent.writable());

    let grandparent = parent.parent().unwrap().unwrap();
    assert!(!grandparent.exists("a.txt").unwrap());
    assert!(grandparent.parent().unwrap().is_none());
}

#[test]
fn back_walks_first_parents() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let s0 = store.branches().get("main").unwrap();
    let s1 = s0.write("a.txt", b"a", Default::default()).unwrap();
    let s2 = s1.write("b.txt", b"b", Default::default()).unwrap();

    assert_eq!(s2.back(0).unwrap().commit_hash(), s2.commit_hash());
    assert_eq!(s2.back(1).unwrap().commit_hash(), s1.commit_hash());
    assert_eq!(s2.back(2).unwrap().commit_hash(), s0.commit_hash());
}

#[test]
fn back_past_root_is_invalid_argument() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    assert!(matches!(snap.back(2), Err(Error::InvalidArgument(_))));
}

// ---------------------------------------------------------------------------
// log
// ---------------------------------------------------------------------------

#[test]
fn log_walks_most_recent_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap.write("a.txt", b"a", Default::default()).unwrap();
    let snap = snap.write("b.txt", b"b", Default::default()).unwrap();

    let entries: Vec<Snapshot> = snap
        .log(Default::default())
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].message().unwrap(), "+ b.txt");
    assert_eq!(entries[1].message().unwrap(), "+ a.txt");
    assert_eq!(entries[2].message().unwrap(), "Initialize main");
    assert!(!entries[0].writable());
}

#[test]
fn log_is_lazy_and_restartable() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap.write("a.txt", b"a", Default::default()).unwrap();

    let mut iter = snap.log(Default::default()).unwrap();
    let first = iter.next().unwrap().unwrap();
    assert_eq!(first.commit_hash(), snap.commit_hash());

    // A fresh iterator starts over.
    let again: Vec<_> = snap.log(Default::default()).unwrap().collect();
    assert_eq!(again.len(), 2);
}

#[test]
fn log_path_filter_yields_touching_commits() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap.write("a.txt", b"1", Default::default()).unwrap();
    let snap = snap.write("other.txt", b"x", Default::default()).unwrap();
    let snap = snap.write("a.txt", b"2", Default::default()).unwrap();

    let touching: Vec<Snapshot> = snap
        .log(LogOptions {
            path: Some("a.txt".into()),
            ..Default::default()
        })
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();

    assert_eq!(touching.len(), 2);
    assert_eq!(touching[0].read_text("a.txt").unwrap(), "2");
    assert_eq!(touching[1].read_text("a.txt").unwrap(), "1");
}

#[test]
fn log_path_filter_counts_deletion() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap.write("f.txt", b"1", Default::default()).unwrap();
    let snap = snap.remove(&["f.txt"], Default::default()).unwrap();

    let touching = snap
        .log(LogOptions {
            path: Some("f.txt".into()),
            ..Default::default()
        })
        .unwrap()
        .count();
    assert_eq!(touching, 2);
}

#[test]
fn log_message_filter() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap
        .write(
            "a.txt",
            b"a",
            WriteOptions {
                message: Some("release: v1".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let snap = snap
        .write(
            "b.txt",
            b"b",
            WriteOptions {
                message: Some("fix: bug".into()),
                ..Default::default()
            },
        )
        .unwrap();

    let releases: Vec<Snapshot> = snap
        .log(LogOptions {
            match_message: Some("release:*".into()),
            ..Default::default()
        })
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].message().unwrap(), "release: v1");
}

#[test]
fn log_filters_combine() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap
        .write(
            "a.txt",
            b"1",
            WriteOptions {
                message: Some("touch a".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let snap = snap
        .write(
            "b.txt",
            b"1",
            WriteOptions {
                message: Some("touch b".into()),
                ..Default::default()
            },
        )
        .unwrap();

    let both = snap
        .log(LogOptions {
            path: Some("a.txt".into()),
            match_message: Some("touch*".into()),
            ..Default::default()
        })
        .unwrap()
        .count();
    assert_eq!(both, 1);
}

// ---------------------------------------------------------------------------
// undo / redo
// ---------------------------------------------------------------------------

#[test]
fn undo_then_redo_restores_tips() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let s0 = store.branches().get("main").unwrap();
    let s1 = s0.write("f", b"1", Default::default()).unwrap();
    let s2 = s1.write("g", b"2", Default::default()).unwrap();

    let s3 = s2.undo(1).unwrap();
    assert_eq!(s3.commit_hash(), s1.commit_hash());
    assert!(!s3.exists("g").unwrap());
    assert_eq!(
        store.branches().get("main").unwrap().commit_hash(),
        s1.commit_hash()
    );

    let s4 = s3.redo(1).unwrap();
    assert_eq!(s4.commit_hash(), s2.commit_hash());
    assert!(s4.exists("g").unwrap());

    // Initial + two writes + undo + redo.
    let reflog = store.branches().reflog("main").unwrap();
    assert_eq!(reflog.len(), 5);
    assert!(reflog[1].message.starts_with("undo"));
    assert!(reflog[0].message.starts_with("redo"));
}

#[test]
fn undo_multiple_steps() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let s0 = store.branches().get("main").unwrap();
    let s1 = s0.write("a", b"1", Default::default()).unwrap();
    let s2 = s1.write("b", b"2", Default::default()).unwrap();

    let back = s2.undo(2).unwrap();
    assert_eq!(back.commit_hash(), s0.commit_hash());
    assert!(back.writable());
}

#[test]
fn undo_zero_or_too_far_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    assert!(matches!(snap.undo(0), Err(Error::InvalidArgument(_))));
    assert!(matches!(snap.undo(5), Err(Error::InvalidArgument(_))));
}

#[test]
fn undo_from_stale_snapshot_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let stale = snap.write("a", b"1", Default::default()).unwrap();
    store
        .branches()
        .get("main")
        .unwrap()
        .write("b", b"2", Default::default())
        .unwrap();

    assert!(matches!(stale.undo(1), Err(Error::StaleSnapshot(_))));
}

#[test]
fn redo_without_undo_is_invalid_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap.write("a", b"1", Default::default()).unwrap();
    assert!(matches!(snap.redo(1), Err(Error::InvalidState(_))));
}

#[test]
fn redo_two_single_steps_after_double_undo() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let s0 = store.branches().get("main").unwrap();
    let s1 = s0.write("a", b"1", Default::default()).unwrap();
    let s2 = s1.write("b", b"2", Default::default()).unwrap();

    let undone = s2.undo(1).unwrap().undo(1).unwrap();
    assert_eq!(undone.commit_hash(), s0.commit_hash());

    let r1 = undone.redo(1).unwrap();
    assert_eq!(r1.commit_hash(), s1.commit_hash());
    let r2 = r1.redo(1).unwrap();
    assert_eq!(r2.commit_hash(), s2.commit_hash());
}

#[test]
fn undo_on_readonly_snapshot_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    let detached = store.snapshot(&snap.commit_hash()).unwrap();
    assert!(matches!(detached.undo(1), Err(Error::Permission(_))));
    assert!(matches!(detached.redo(1), Err(Error::Permission(_))));
}

#[test]
fn writes_after_undo_branch_history() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap.write("a", b"1", Default::default()).unwrap();
    let undone = snap.undo(1).unwrap();

    let replacement = undone.write("c", b"3", Default::default()).unwrap();
    assert!(replacement.exists("c").unwrap());
    assert!(!replacement.exists("a").unwrap());
    assert_eq!(
        store.branches().get("main").unwrap().commit_hash(),
        replacement.commit_hash()
    );
}

// ---------------------------------------------------------------------------
// reflog
// ---------------------------------------------------------------------------

#[test]
fn reflog_tracks_every_transition() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let s0 = store.branches().get("main").unwrap();
    let s1 = s0.write("a", b"1", Default::default()).unwrap();

    let reflog = store.branches().reflog("main").unwrap();
    assert_eq!(reflog.len(), 2);

    // Most recent first; the chain links old -> new.
    assert_eq!(reflog[0].old_oid, s0.commit_hash());
    assert_eq!(reflog[0].new_oid, s1.commit_hash());
    assert_eq!(reflog[0].message, "commit: + a");
    assert_eq!(reflog[1].old_oid, "0".repeat(40));
    assert_eq!(reflog[1].new_oid, s0.commit_hash());
    assert_eq!(reflog[0].committer, "vost <vost@localhost>");
}

#[test]
fn reflog_missing_branch_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    assert!(matches!(
        store.branches().reflog("ghost"),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn noop_write_leaves_no_reflog_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap.write("f", b"same", Default::default()).unwrap();
    let len_before = store.branches().reflog("main").unwrap().len();

    snap.write("f", b"same", Default::default()).unwrap();
    assert_eq!(store.branches().reflog("main").unwrap().len(), len_before);
}
