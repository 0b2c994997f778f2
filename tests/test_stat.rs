mod common;

use vost::*;

#[test]
fn stat_regular_file() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let st = snap.stat("hello.txt").unwrap();
    assert_eq!(st.mode, MODE_BLOB);
    assert_eq!(st.file_type, FileType::Blob);
    assert_eq!(st.size, 5);
    assert_eq!(st.nlink, 1);
    assert_eq!(st.oid, snap.object_hash("hello.txt").unwrap());
    assert_eq!(st.mtime, snap.time().unwrap());
}

#[test]
fn stat_directory() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let st = snap.stat("dir").unwrap();
    assert_eq!(st.mode, MODE_TREE);
    assert_eq!(st.file_type, FileType::Tree);
    assert_eq!(st.size, 0);
    // dir contains one subdirectory (sub).
    assert_eq!(st.nlink, 3);
}

#[test]
fn stat_root() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let st = snap.stat("").unwrap();
    assert_eq!(st.file_type, FileType::Tree);
    assert_eq!(st.oid, snap.tree_hash());
    // Root has one subdirectory (dir).
    assert_eq!(st.nlink, 3);
}

#[test]
fn stat_symlink() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let snap = snap
        .write_symlink("ln", "hello.txt", Default::default())
        .unwrap();
    let st = snap.stat("ln").unwrap();
    assert_eq!(st.mode, MODE_LINK);
    assert_eq!(st.file_type, FileType::Link);
    assert_eq!(st.size, "hello.txt".len() as u64);
    assert_eq!(st.nlink, 1);
}

#[test]
fn stat_executable() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let snap = snap
        .write(
            "run.sh",
            b"#!/bin/sh\n",
            WriteOptions {
                mode: Some(MODE_BLOB_EXEC),
                ..Default::default()
            },
        )
        .unwrap();
    let st = snap.stat("run.sh").unwrap();
    assert_eq!(st.mode, MODE_BLOB_EXEC);
    assert_eq!(st.file_type, FileType::Executable);
}

#[test]
fn stat_missing_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert!(matches!(snap.stat("ghost"), Err(Error::NotFound(_))));
}

#[test]
fn stat_mtime_pinned_by_clock() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(
        dir.path().join("store.git"),
        OpenOptions {
            create: true,
            branch: Some("main".into()),
            timestamp: Some(1_234_567_890),
            ..Default::default()
        },
    )
    .unwrap();
    let snap = store.branches().get("main").unwrap();
    let snap = snap.write("f", b"x", Default::default()).unwrap();
    assert_eq!(snap.stat("f").unwrap().mtime, 1_234_567_890);
    assert_eq!(snap.time().unwrap(), 1_234_567_890);
}
