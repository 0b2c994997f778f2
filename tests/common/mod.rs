use std::path::Path;

use vost::*;

pub fn create_store(dir: &Path, branch: &str) -> Store {
    Store::open(
        dir.join("store.git"),
        OpenOptions {
            create: true,
            branch: Some(branch.into()),
            ..Default::default()
        },
    )
    .unwrap()
}

#[allow(dead_code)]
pub fn store_with_files(dir: &Path) -> (Store, Snapshot) {
    let store = create_store(dir, "main");
    let snap = store.branches().get("main").unwrap();
    let snap = snap
        .with_batch(Default::default(), |b| {
            b.write("hello.txt", b"hello")?;
            b.write("dir/a.txt", b"aaa")?;
            b.write("dir/b.txt", b"bbb")?;
            b.write("dir/sub/deep.txt", b"deep")?;
            Ok(())
        })
        .unwrap();
    (store, snap)
}
