//! Repository-wide advisory lock.
//!
//! All ref mutations serialize on an exclusive file lock at
//! `<gitdir>/vost.lock`. Callers hold the in-process repository mutex for
//! the whole critical section, so the file lock only ever arbitrates
//! between processes. The lock is released on every exit path, including
//! errors from the guarded closure.

use std::fs::OpenOptions;
use std::path::Path;

use fs2::FileExt;

use crate::error::{Error, Result};

/// Name of the advisory lock file inside the bare repository.
pub const LOCK_FILE: &str = "vost.lock";

/// Run `f` while holding the exclusive repository lock.
///
/// Blocks until the lock is available. The lock file is created on first
/// use; its contents are advisory and never read.
pub fn with_repo_lock<F, T>(gitdir: &Path, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let lock_path = gitdir.join(LOCK_FILE);

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| Error::io(&lock_path, e))?;

    file.lock_exclusive()
        .map_err(|e| Error::io(&lock_path, e))?;
    log::trace!("acquired repo lock at {}", lock_path.display());

    let result = f();

    let _ = file.unlock();
    result
}
