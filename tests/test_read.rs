mod common;

use vost::*;

// ---------------------------------------------------------------------------
// read / read_text / read_range / read_by_hash
// ---------------------------------------------------------------------------

#[test]
fn read_returns_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert_eq!(snap.read("hello.txt").unwrap(), b"hello");
    assert_eq!(snap.read("dir/a.txt").unwrap(), b"aaa");
}

#[test]
fn read_missing_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert!(matches!(snap.read("nope.txt"), Err(Error::NotFound(_))));
    assert!(matches!(
        snap.read("dir/nope.txt"),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn read_directory_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert!(matches!(snap.read("dir"), Err(Error::IsADirectory(_))));
}

#[test]
fn read_through_blob_is_not_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert!(matches!(
        snap.read("hello.txt/below"),
        Err(Error::NotADirectory(_))
    ));
}

#[test]
fn read_rejects_dotdot() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert!(matches!(
        snap.read("../escape"),
        Err(Error::InvalidPath(_))
    ));
}

#[test]
fn read_normalizes_path_forms() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert_eq!(snap.read("/dir/a.txt").unwrap(), b"aaa");
    assert_eq!(snap.read("./dir/./a.txt").unwrap(), b"aaa");
    assert_eq!(snap.read("dir/a.txt/").unwrap(), b"aaa");
}

#[test]
fn read_rejects_interior_double_slash() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert!(matches!(
        snap.read("dir//a.txt"),
        Err(Error::InvalidPath(_))
    ));
}

#[test]
fn read_text_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert_eq!(snap.read_text("hello.txt").unwrap(), "hello");
}

#[test]
fn read_range_clamps() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert_eq!(snap.read_range("hello.txt", 0, Some(2)).unwrap(), b"he");
    assert_eq!(snap.read_range("hello.txt", 3, None).unwrap(), b"lo");
    assert_eq!(snap.read_range("hello.txt", 3, Some(100)).unwrap(), b"lo");
    assert_eq!(snap.read_range("hello.txt", 100, Some(5)).unwrap(), b"");
    assert_eq!(
        snap.read_range("hello.txt", usize::MAX, Some(usize::MAX))
            .unwrap(),
        b""
    );
}

#[test]
fn read_by_hash_bypasses_tree() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let hash = snap.object_hash("hello.txt").unwrap();
    assert_eq!(snap.read_by_hash(&hash, 0, None).unwrap(), b"hello");
    assert_eq!(snap.read_by_hash(&hash, 1, Some(3)).unwrap(), b"ell");
}

#[test]
fn read_by_hash_validates_input() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert!(matches!(
        snap.read_by_hash("zz", 0, None),
        Err(Error::InvalidHash(_))
    ));
    assert!(matches!(
        snap.read_by_hash("0123456789abcdef0123456789abcdef01234567", 0, None),
        Err(Error::NotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// ls / listdir / walk
// ---------------------------------------------------------------------------

#[test]
fn ls_root_and_subdir() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert_eq!(snap.ls("").unwrap(), vec!["dir", "hello.txt"]);
    assert_eq!(snap.ls("dir").unwrap(), vec!["a.txt", "b.txt", "sub"]);
}

#[test]
fn ls_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path(), "main");
    let snap = store.branches().get("main").unwrap();
    assert!(snap.ls("").unwrap().is_empty());
}

#[test]
fn ls_on_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert!(matches!(
        snap.ls("hello.txt"),
        Err(Error::NotADirectory(_))
    ));
}

#[test]
fn listdir_entries_have_modes() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let entries = snap.listdir("").unwrap();
    let dir_entry = entries.iter().find(|e| e.name == "dir").unwrap();
    assert_eq!(dir_entry.mode, MODE_TREE);
    assert_eq!(dir_entry.file_type(), Some(FileType::Tree));
    let file_entry = entries.iter().find(|e| e.name == "hello.txt").unwrap();
    assert_eq!(file_entry.mode, MODE_BLOB);
}

#[test]
fn walk_is_preorder() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let walked = snap.walk("").unwrap();
    let dirpaths: Vec<&str> = walked.iter().map(|w| w.dirpath.as_str()).collect();
    assert_eq!(dirpaths, vec!["", "dir", "dir/sub"]);

    assert_eq!(walked[0].dirs, vec!["dir"]);
    let root_files: Vec<&str> = walked[0].files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(root_files, vec!["hello.txt"]);
}

#[test]
fn walk_subdir_keeps_full_paths() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let walked = snap.walk("dir").unwrap();
    let dirpaths: Vec<&str> = walked.iter().map(|w| w.dirpath.as_str()).collect();
    assert_eq!(dirpaths, vec!["dir", "dir/sub"]);
}

#[test]
fn walk_on_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert!(matches!(
        snap.walk("hello.txt"),
        Err(Error::NotADirectory(_))
    ));
}

// ---------------------------------------------------------------------------
// exists / is_dir / file_type / size / object_hash
// ---------------------------------------------------------------------------

#[test]
fn exists_and_is_dir() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert!(snap.exists("hello.txt").unwrap());
    assert!(snap.exists("dir").unwrap());
    assert!(snap.exists("dir/sub/deep.txt").unwrap());
    assert!(!snap.exists("missing").unwrap());
    assert!(!snap.exists("hello.txt/below").unwrap());

    assert!(snap.is_dir("dir").unwrap());
    assert!(!snap.is_dir("hello.txt").unwrap());
    assert!(!snap.is_dir("missing").unwrap());
}

#[test]
fn file_type_variants() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    assert_eq!(snap.file_type("hello.txt").unwrap(), FileType::Blob);
    assert_eq!(snap.file_type("dir").unwrap(), FileType::Tree);

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
    assert_eq!(snap.file_type("run.sh").unwrap(), FileType::Executable);

    let snap = store.branches().get("main").unwrap();
    let snap = snap
        .write_symlink("ln", "hello.txt", Default::default())
        .unwrap();
    assert_eq!(snap.file_type("ln").unwrap(), FileType::Link);
}

#[test]
fn size_of_blob_and_dir() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert_eq!(snap.size("hello.txt").unwrap(), 5);
    assert!(matches!(snap.size("dir"), Err(Error::IsADirectory(_))));
}

#[test]
fn object_hash_is_stable_for_content() {
    let dir = tempfile::tempdir().unwrap();
    let (store, snap) = common::store_with_files(dir.path());
    let h1 = snap.object_hash("hello.txt").unwrap();
    assert_eq!(h1.len(), 40);

    // Same bytes elsewhere hash to the same object.
    let snap2 = store.branches().get("main").unwrap();
    let snap2 = snap2
        .write("copy.txt", b"hello", Default::default())
        .unwrap();
    assert_eq!(snap2.object_hash("copy.txt").unwrap(), h1);
}

#[test]
fn object_hash_of_root_is_tree_hash() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert_eq!(snap.object_hash("").unwrap(), snap.tree_hash());
}

// ---------------------------------------------------------------------------
// readlink
// ---------------------------------------------------------------------------

#[test]
fn readlink_returns_target() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let snap = snap
        .write_symlink("ln", "dir/a.txt", Default::default())
        .unwrap();
    assert_eq!(snap.readlink("ln").unwrap(), "dir/a.txt");
}

#[test]
fn readlink_on_regular_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert!(matches!(
        snap.readlink("hello.txt"),
        Err(Error::InvalidArgument(_))
    ));
}

// ---------------------------------------------------------------------------
// snapshot metadata
// ---------------------------------------------------------------------------

#[test]
fn metadata_accessors() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    assert_eq!(snap.commit_hash().len(), 40);
    assert_eq!(snap.tree_hash().len(), 40);
    assert_eq!(snap.ref_name(), Some("main"));
    assert!(snap.writable());
    assert_eq!(snap.author_name().unwrap(), "vost");
    assert_eq!(snap.author_email().unwrap(), "vost@localhost");
    assert!(snap.time().unwrap() > 0);
}

#[test]
fn snapshots_are_immutable_values() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snap) = common::store_with_files(dir.path());
    let before = snap.commit_hash();

    let after = snap
        .write("extra.txt", b"x", Default::default())
        .unwrap();

    // The original still answers from its own tree.
    assert_eq!(snap.commit_hash(), before);
    assert!(!snap.exists("extra.txt").unwrap());
    assert!(after.exists("extra.txt").unwrap());
}
