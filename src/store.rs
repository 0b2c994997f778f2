//! The repository handle: opening/creating the bare store and handing out
//! branch, tag, and notes views.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::notes::Notes;
use crate::refs::RefDict;
use crate::snapshot::Snapshot;
use crate::types::{BackupOptions, MirrorDiff, OpenOptions, RestoreOptions, Signature};

/// Commit clock: wall time, or a pinned timestamp for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Clock {
    System,
    Fixed(u64),
}

impl Clock {
    pub(crate) fn now(&self) -> u64 {
        match self {
            Clock::Fixed(secs) => *secs,
            Clock::System => std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// State shared between a [`Store`] and every [`Snapshot`] derived from it.
///
/// The repository mutex doubles as the in-process half of the advisory
/// lock: ref transactions hold it for their whole critical section, so the
/// on-disk file lock only arbitrates between processes.
pub(crate) struct StoreShared {
    pub(crate) repo: Mutex<git2::Repository>,
    pub(crate) path: PathBuf,
    pub(crate) signature: Signature,
    pub(crate) clock: Clock,
}

impl StoreShared {
    /// Lock the repository mutex and run `f`.
    pub(crate) fn with_repo<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&git2::Repository) -> Result<T>,
    {
        let guard = self.lock_repo()?;
        f(&guard)
    }

    pub(crate) fn lock_repo(&self) -> Result<MutexGuard<'_, git2::Repository>> {
        self.repo
            .lock()
            .map_err(|e| Error::git_msg(format!("repository mutex poisoned: {}", e)))
    }

    /// A git signature carrying the store identity and the clock's time.
    pub(crate) fn git_signature(&self) -> Result<git2::Signature<'static>> {
        let time = git2::Time::new(self.clock.now() as i64, 0);
        git2::Signature::new(&self.signature.name, &self.signature.email, &time)
            .map_err(Error::git)
    }
}

impl std::fmt::Debug for StoreShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreShared")
            .field("path", &self.path)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// A versioned object store backed by a bare git-format repository.
///
/// Cheap to clone; all clones share one repository handle. The `Store`
/// outlives every snapshot taken from it only logically; snapshots hold an
/// `Arc` to the shared state, so dropping the `Store` is always safe.
#[derive(Clone, Debug)]
pub struct Store {
    pub(crate) shared: Arc<StoreShared>,
}

impl Store {
    /// Open a bare repository at `path`, creating it when
    /// `options.create` is set.
    ///
    /// On creation the default branch (`options.branch`, or `"main"`) is
    /// initialized with an empty-tree commit and HEAD is attached to it.
    ///
    /// # Errors
    /// [`Error::NotFound`] when the repository is missing and `create` is
    /// off.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let signature = Signature {
            name: options.author.unwrap_or_else(|| "vost".into()),
            email: options.email.unwrap_or_else(|| "vost@localhost".into()),
        };
        let clock = match options.timestamp {
            Some(t) => Clock::Fixed(t),
            None => Clock::System,
        };

        let repo = if path.exists() {
            git2::Repository::open_bare(&path).map_err(Error::git)?
        } else if options.create {
            std::fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
            let repo = git2::Repository::init_bare(&path).map_err(Error::git)?;
            let branch = options.branch.as_deref().unwrap_or("main");
            crate::path::validate_ref_name(branch)?;
            init_branch(&repo, &path, branch, &signature, clock)?;
            repo
        } else {
            return Err(Error::not_found(format!(
                "repository not found: {}",
                path.display()
            )));
        };

        Ok(Store {
            shared: Arc::new(StoreShared {
                repo: Mutex::new(repo),
                path,
                signature,
                clock,
            }),
        })
    }

    /// Dictionary view over branches (`refs/heads/`). Branch snapshots are
    /// writable.
    pub fn branches(&self) -> RefDict {
        RefDict::branches(Arc::clone(&self.shared))
    }

    /// Dictionary view over tags (`refs/tags/`). Tag snapshots are
    /// read-only.
    pub fn tags(&self) -> RefDict {
        RefDict::tags(Arc::clone(&self.shared))
    }

    /// Notes namespaces (`refs/notes/<ns>`).
    pub fn notes(&self) -> Notes {
        Notes::new(Arc::clone(&self.shared))
    }

    /// A detached read-only snapshot of the commit named by a 40-hex id.
    ///
    /// # Errors
    /// [`Error::InvalidHash`] on a malformed id, [`Error::NotFound`] when
    /// the commit is not in the object store.
    pub fn snapshot(&self, hash: &str) -> Result<Snapshot> {
        crate::path::validate_hex_oid(hash)?;
        let oid = git2::Oid::from_str(hash).map_err(|_| Error::invalid_hash(hash))?;
        Snapshot::from_commit(Arc::clone(&self.shared), oid, None, false)
    }

    /// Resolve a revision (branch, tag, or abbreviated hash) to a detached
    /// read-only snapshot.
    pub fn resolve(&self, rev: &str) -> Result<Snapshot> {
        let oid = self.shared.with_repo(|repo| {
            let obj = repo
                .revparse_single(rev)
                .map_err(|_| Error::not_found(format!("cannot resolve revision {:?}", rev)))?;
            let commit = obj
                .peel_to_commit()
                .map_err(|_| Error::not_found(format!("{:?} does not name a commit", rev)))?;
            Ok(commit.id())
        })?;
        Snapshot::from_commit(Arc::clone(&self.shared), oid, None, false)
    }

    /// Path of the bare repository on disk.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// The identity used for commits and reflog entries.
    pub fn signature(&self) -> &Signature {
        &self.shared.signature
    }

    /// Replicate refs to `dest`: another bare repository (local path or
    /// URL) or a `.bundle` file. A full backup mirrors (deletes
    /// remote-only refs); a `refs`-filtered backup never deletes.
    pub fn backup(&self, dest: &str, opts: &BackupOptions) -> Result<MirrorDiff> {
        crate::mirror::backup(&self.shared.path, dest, opts)
    }

    /// Fetch refs from `src` (repository or bundle). Additive: local-only
    /// refs are never deleted.
    pub fn restore(&self, src: &str, opts: &RestoreOptions) -> Result<MirrorDiff> {
        crate::mirror::restore(&self.shared.path, src, opts)
    }
}

/// Create the initial empty-tree commit on `branch` and attach HEAD.
fn init_branch(
    repo: &git2::Repository,
    gitdir: &Path,
    branch: &str,
    signature: &Signature,
    clock: Clock,
) -> Result<()> {
    let tree_oid = crate::tree::empty_tree(repo)?;
    let tree = repo.find_tree(tree_oid).map_err(Error::git)?;

    let time = git2::Time::new(clock.now() as i64, 0);
    let sig = git2::Signature::new(&signature.name, &signature.email, &time).map_err(Error::git)?;

    let message = format!("Initialize {}", branch);
    let refname = format!("refs/heads/{}", branch);
    let commit_oid = repo
        .commit(Some(&refname), &sig, &sig, &message, &tree, &[])
        .map_err(Error::git)?;

    crate::reflog::append(
        gitdir,
        &refname,
        &crate::types::ReflogEntry {
            old_oid: crate::reflog::ZERO_OID.to_string(),
            new_oid: commit_oid.to_string(),
            committer: signature.identity(),
            timestamp: clock.now(),
            message: format!("commit: {}", message),
        },
    )?;

    repo.set_head(&refname).map_err(Error::git)?;
    log::debug!("initialized branch {} at {}", branch, commit_oid);
    Ok(())
}
