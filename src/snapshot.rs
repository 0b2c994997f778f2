//! Immutable snapshots of committed trees.
//!
//! A [`Snapshot`] is a value: reads never change it, and every successful
//! write returns a *new* snapshot while the original keeps its view. Write
//! methods stage a plan and run it through the ref updater
//! ([`crate::update`]), which enforces optimistic concurrency against the
//! branch tip.

use std::path::Path;
use std::sync::Arc;

use crate::batch::Batch;
use crate::copy::{self, CopyFromRefOptions, CopyInOptions, CopyOutOptions, SyncOptions};
use crate::error::{Error, Result};
use crate::store::StoreShared;
use crate::tree;
use crate::types::{
    ChangeReport, FileType, Stat, TreeEntry, WalkDir, WriteEntry, MODE_BLOB, MODE_LINK, MODE_TREE,
};
use crate::update::{self, PendingWrite, Plan};

// ---------------------------------------------------------------------------
// Option structs
// ---------------------------------------------------------------------------

/// Options for the single-path write methods.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Commit message; derived from the change report if unset.
    pub message: Option<String>,
    /// Filemode override (e.g. [`crate::MODE_BLOB_EXEC`]).
    pub mode: Option<u32>,
}

/// Options for [`Snapshot::apply`].
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Commit message; derived from the change report if unset.
    pub message: Option<String>,
    /// Label folded into derived batch messages (e.g. `"import"`).
    pub operation: Option<String>,
}

/// Options for [`Snapshot::batch`].
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Commit message; derived from the change report if unset.
    pub message: Option<String>,
    /// Label folded into derived batch messages.
    pub operation: Option<String>,
}

/// Options for [`Snapshot::remove`].
#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    /// Allow removing directories and their contents.
    pub recursive: bool,
    /// Report what would change without writing anything.
    pub dry_run: bool,
    /// Commit message; derived from the change report if unset.
    pub message: Option<String>,
}

/// Options for [`Snapshot::rename`] and [`Snapshot::move_paths`].
#[derive(Debug, Clone, Default)]
pub struct MoveOptions {
    /// Allow moving directories and their contents.
    pub recursive: bool,
    /// Report what would change without writing anything.
    pub dry_run: bool,
    /// Commit message; derived from the change report if unset.
    pub message: Option<String>,
}

/// Filters for [`Snapshot::log`].
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Only yield commits that changed this path (or where it appeared or
    /// disappeared); the initial commit is yielded iff the path exists in
    /// it.
    pub path: Option<String>,
    /// Shell-style glob the commit message must match (`*` / `?`).
    pub match_message: Option<String>,
    /// Only yield commits with timestamp `<=` this epoch value.
    pub before: Option<u64>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable view of one commit's tree.
///
/// Writable iff it was obtained from a branch; tag and detached snapshots
/// refuse writes with [`Error::Permission`]. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub(crate) shared: Arc<StoreShared>,
    pub(crate) commit_oid: git2::Oid,
    pub(crate) tree_oid: git2::Oid,
    pub(crate) ref_name: Option<String>,
    pub(crate) writable: bool,
    pub(crate) changes: Option<ChangeReport>,
}

impl Snapshot {
    pub(crate) fn from_commit(
        shared: Arc<StoreShared>,
        commit_oid: git2::Oid,
        ref_name: Option<String>,
        writable: bool,
    ) -> Result<Self> {
        let tree_oid = shared.with_repo(|repo| {
            let commit = repo
                .find_commit(commit_oid)
                .map_err(|_| Error::not_found(format!("no such commit: {}", commit_oid)))?;
            Ok(commit.tree_id())
        })?;
        Ok(Snapshot {
            shared,
            commit_oid,
            tree_oid,
            ref_name,
            writable,
            changes: None,
        })
    }

    fn with_repo<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&git2::Repository) -> Result<T>,
    {
        self.shared.with_repo(f)
    }

    fn require_writable(&self, verb: &str) -> Result<&str> {
        if !self.writable {
            return Err(match &self.ref_name {
                Some(name) => Error::permission(format!(
                    "cannot {} a read-only snapshot (ref {:?})",
                    verb, name
                )),
                None => Error::permission(format!("cannot {} a detached snapshot", verb)),
            });
        }
        self.ref_name
            .as_deref()
            .ok_or_else(|| Error::permission(format!("cannot {} without a branch", verb)))
    }

    // -- Metadata -----------------------------------------------------------

    /// 40-hex id of this snapshot's commit.
    pub fn commit_hash(&self) -> String {
        self.commit_oid.to_string()
    }

    /// 40-hex id of this snapshot's root tree.
    pub fn tree_hash(&self) -> String {
        self.tree_oid.to_string()
    }

    /// The branch or tag name this snapshot was taken from, if any.
    pub fn ref_name(&self) -> Option<&str> {
        self.ref_name.as_deref()
    }

    /// Whether writes are allowed (true only for branch snapshots).
    pub fn writable(&self) -> bool {
        self.writable
    }

    /// The change report of the mutation that produced this snapshot.
    pub fn changes(&self) -> Option<&ChangeReport> {
        self.changes.as_ref()
    }

    /// The commit message, without the trailing newline.
    pub fn message(&self) -> Result<String> {
        self.with_repo(|repo| {
            let commit = repo.find_commit(self.commit_oid).map_err(Error::git)?;
            Ok(commit
                .message()
                .unwrap_or("")
                .trim_end_matches('\n')
                .to_string())
        })
    }

    /// Committer timestamp in epoch seconds.
    pub fn time(&self) -> Result<u64> {
        self.with_repo(|repo| {
            let commit = repo.find_commit(self.commit_oid).map_err(Error::git)?;
            Ok(commit.time().seconds().max(0) as u64)
        })
    }

    /// Commit author name.
    pub fn author_name(&self) -> Result<String> {
        self.with_repo(|repo| {
            let commit = repo.find_commit(self.commit_oid).map_err(Error::git)?;
            let name = commit.author().name().unwrap_or("").to_string();
            Ok(name)
        })
    }

    /// Commit author email.
    pub fn author_email(&self) -> Result<String> {
        self.with_repo(|repo| {
            let commit = repo.find_commit(self.commit_oid).map_err(Error::git)?;
            let email = commit.author().email().unwrap_or("").to_string();
            Ok(email)
        })
    }

    // -- Reads --------------------------------------------------------------

    /// Read the file at `path`.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = crate::path::normalize(path)?;
        self.with_repo(|repo| tree::read_blob(repo, self.tree_oid, &path))
    }

    /// Read a clamped byte range of the file at `path`. Offsets past the
    /// end yield an empty result.
    pub fn read_range(&self, path: &str, offset: usize, size: Option<usize>) -> Result<Vec<u8>> {
        let data = self.read(path)?;
        Ok(tree::clamp_range(&data, offset, size))
    }

    /// Read the file at `path` as UTF-8 text.
    pub fn read_text(&self, path: &str) -> Result<String> {
        String::from_utf8(self.read(path)?)
            .map_err(|e| Error::invalid_argument(format!("not valid UTF-8: {}", e)))
    }

    /// Read a blob by its 40-hex id, bypassing the tree.
    pub fn read_by_hash(&self, hash: &str, offset: usize, size: Option<usize>) -> Result<Vec<u8>> {
        crate::path::validate_hex_oid(hash)?;
        let oid = git2::Oid::from_str(hash).map_err(|_| Error::invalid_hash(hash))?;
        self.with_repo(|repo| {
            let blob = repo
                .find_blob(oid)
                .map_err(|_| Error::not_found(format!("no such blob: {}", hash)))?;
            Ok(tree::clamp_range(blob.content(), offset, size))
        })
    }

    /// The target of the symlink at `path`.
    pub fn readlink(&self, path: &str) -> Result<String> {
        let path = crate::path::normalize(path)?;
        self.with_repo(|repo| {
            let node = tree::require(repo, self.tree_oid, &path)?;
            if node.mode != MODE_LINK {
                return Err(Error::invalid_argument(format!(
                    "{} is not a symlink",
                    path
                )));
            }
            let blob = repo.find_blob(node.oid).map_err(Error::git)?;
            String::from_utf8(blob.content().to_vec())
                .map_err(|e| Error::invalid_argument(format!("invalid UTF-8 in symlink: {}", e)))
        })
    }

    /// Names of the entries at `path` (root for `""`).
    pub fn ls(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.listdir(path)?.into_iter().map(|e| e.name).collect())
    }

    /// Entries (name, id, mode) at `path` (root for `""`).
    pub fn listdir(&self, path: &str) -> Result<Vec<TreeEntry>> {
        let path = crate::path::normalize(path)?;
        self.with_repo(|repo| tree::list_dir(repo, self.tree_oid, &path))
    }

    /// os.walk-style traversal of the tree under `path`, parents before
    /// children.
    pub fn walk(&self, path: &str) -> Result<Vec<WalkDir>> {
        let path = crate::path::normalize(path)?;
        self.with_repo(|repo| {
            let dir_oid = tree::require_dir(repo, self.tree_oid, &path)?;
            let mut dirs = tree::walk_dirs(repo, dir_oid)?;
            if !path.is_empty() {
                for d in &mut dirs {
                    d.dirpath = crate::path::join(&path, &d.dirpath);
                }
            }
            Ok(dirs)
        })
    }

    /// Whether anything exists at `path`.
    pub fn exists(&self, path: &str) -> Result<bool> {
        let path = crate::path::normalize(path)?;
        self.with_repo(|repo| Ok(tree::lookup(repo, self.tree_oid, &path)?.is_some()))
    }

    /// Whether `path` is a directory.
    pub fn is_dir(&self, path: &str) -> Result<bool> {
        let path = crate::path::normalize(path)?;
        self.with_repo(|repo| {
            Ok(matches!(
                tree::lookup(repo, self.tree_oid, &path)?,
                Some(node) if node.is_tree()
            ))
        })
    }

    /// The [`FileType`] at `path`.
    pub fn file_type(&self, path: &str) -> Result<FileType> {
        let path = crate::path::normalize(path)?;
        self.with_repo(|repo| {
            let node = tree::require(repo, self.tree_oid, &path)?;
            FileType::from_mode(node.mode)
                .ok_or_else(|| Error::git_msg(format!("unknown filemode {:#o}", node.mode)))
        })
    }

    /// Size in bytes of the blob at `path`.
    pub fn size(&self, path: &str) -> Result<u64> {
        let path = crate::path::normalize(path)?;
        self.with_repo(|repo| {
            let node = tree::require(repo, self.tree_oid, &path)?;
            if node.is_tree() {
                return Err(Error::is_a_directory(&path));
            }
            let blob = repo.find_blob(node.oid).map_err(Error::git)?;
            Ok(blob.content().len() as u64)
        })
    }

    /// 40-hex id of the object at `path`; the root path yields the tree id.
    pub fn object_hash(&self, path: &str) -> Result<String> {
        let path = crate::path::normalize(path)?;
        self.with_repo(|repo| {
            let node = tree::require(repo, self.tree_oid, &path)?;
            Ok(node.oid.to_string())
        })
    }

    /// Metadata for `path` (root accepted). `mtime` is the committer
    /// timestamp; `nlink` for a tree is `2 + direct subtree count`.
    pub fn stat(&self, path: &str) -> Result<Stat> {
        let path = crate::path::normalize(path)?;
        let mtime = self.time()?;
        self.with_repo(|repo| {
            let node = tree::require(repo, self.tree_oid, &path)?;
            let file_type = FileType::from_mode(node.mode)
                .ok_or_else(|| Error::git_msg(format!("unknown filemode {:#o}", node.mode)))?;
            if node.is_tree() {
                Ok(Stat {
                    mode: MODE_TREE,
                    file_type,
                    size: 0,
                    oid: node.oid.to_string(),
                    nlink: 2 + tree::count_subdirs(repo, node.oid)?,
                    mtime,
                })
            } else {
                let blob = repo.find_blob(node.oid).map_err(Error::git)?;
                Ok(Stat {
                    mode: node.mode,
                    file_type,
                    size: blob.content().len() as u64,
                    oid: node.oid.to_string(),
                    nlink: 1,
                    mtime,
                })
            }
        })
    }

    /// Expand a glob against the tree, sorted. `**` spans segments; a
    /// wildcard never matches a leading `.`.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let mut paths = self.iglob(pattern)?;
        paths.sort();
        Ok(paths)
    }

    /// Expand a glob against the tree, in traversal order.
    pub fn iglob(&self, pattern: &str) -> Result<Vec<String>> {
        self.with_repo(|repo| crate::glob::expand(repo, self.tree_oid, pattern))
    }

    /// Minimal file-level differences going from `other` to this snapshot,
    /// under `scope` (`""` for the whole tree).
    ///
    /// Subtrees with equal ids are skipped wholesale, so diffing two large
    /// but mostly-shared snapshots is cheap.
    pub fn diff(&self, other: &Snapshot, scope: &str) -> Result<ChangeReport> {
        self.require_same_store(other)?;
        let scope = crate::path::normalize(scope)?;
        self.with_repo(|repo| {
            crate::diff::diff_trees(repo, Some(other.tree_oid), Some(self.tree_oid), &scope)
        })
    }

    // -- History ------------------------------------------------------------

    /// Walk the first-parent history from this snapshot, lazily yielding
    /// read-only snapshots that pass the [`LogOptions`] filters.
    pub fn log(&self, opts: LogOptions) -> Result<History> {
        let path = opts.path.as_deref().map(crate::path::normalize).transpose()?;
        Ok(History {
            shared: Arc::clone(&self.shared),
            next: Some(self.commit_oid),
            path,
            pattern: opts.match_message,
            before: opts.before,
        })
    }

    /// The first-parent snapshot, read-only; `None` at the initial commit.
    pub fn parent(&self) -> Result<Option<Snapshot>> {
        let parent_oid = self.with_repo(|repo| {
            let commit = repo.find_commit(self.commit_oid).map_err(Error::git)?;
            if commit.parent_count() == 0 {
                Ok(None)
            } else {
                Ok(Some(commit.parent_id(0).map_err(Error::git)?))
            }
        })?;
        parent_oid
            .map(|oid| Snapshot::from_commit(Arc::clone(&self.shared), oid, None, false))
            .transpose()
    }

    /// The snapshot `n` first-parent steps back; `back(0)` is this
    /// snapshot.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] when history is shorter than `n`.
    pub fn back(&self, n: usize) -> Result<Snapshot> {
        let mut current = self.clone();
        for step in 0..n {
            current = current.parent()?.ok_or_else(|| {
                Error::invalid_argument(format!(
                    "history is only {} commit(s) deep, cannot go back {}",
                    step, n
                ))
            })?;
        }
        Ok(current)
    }

    /// Move the branch back `n` commits along the first-parent chain.
    ///
    /// Writes a reflog entry prefixed `"undo"`. The returned snapshot is
    /// the new branch tip.
    pub fn undo(&self, n: usize) -> Result<Snapshot> {
        let branch = self.require_writable("undo")?.to_string();
        if n < 1 {
            return Err(Error::invalid_argument("undo requires n >= 1"));
        }
        let target = self.back(n)?;
        update::move_branch(
            &self.shared,
            &branch,
            self.commit_oid,
            target.commit_oid,
            &format!("undo: {} commit(s)", n),
        )?;
        Snapshot::from_commit(
            Arc::clone(&self.shared),
            target.commit_oid,
            self.ref_name.clone(),
            true,
        )
    }

    /// Re-advance the branch across the `n` most recent not-yet-redone
    /// undo steps, using the reflog.
    ///
    /// # Errors
    /// [`Error::InvalidState`] when no applicable undo entry exists.
    pub fn redo(&self, n: usize) -> Result<Snapshot> {
        let branch = self.require_writable("redo")?.to_string();
        if n < 1 {
            return Err(Error::invalid_argument("redo requires n >= 1"));
        }
        let refname = format!("refs/heads/{}", branch);
        let entries = crate::reflog::read_or_empty(&self.shared.path, &refname)?;

        let mut cursor = self.commit_oid.to_string();
        for _ in 0..n {
            cursor = entries
                .iter()
                .find(|e| e.new_oid == cursor && e.message.starts_with("undo"))
                .map(|e| e.old_oid.clone())
                .ok_or_else(|| {
                    Error::invalid_state(format!("no redo history on branch {:?}", branch))
                })?;
        }

        let target =
            git2::Oid::from_str(&cursor).map_err(|_| Error::invalid_hash(cursor.clone()))?;
        update::move_branch(
            &self.shared,
            &branch,
            self.commit_oid,
            target,
            &format!("redo: {} commit(s)", n),
        )?;
        Snapshot::from_commit(Arc::clone(&self.shared), target, self.ref_name.clone(), true)
    }

    // -- Writes -------------------------------------------------------------

    /// Write `data` to `path` in a single commit, returning the new
    /// snapshot. Writing identical content is a no-op (same commit id).
    pub fn write(&self, path: &str, data: &[u8], opts: WriteOptions) -> Result<Snapshot> {
        self.require_writable("write to")?;
        let path = crate::path::normalize(path)?;
        if path.is_empty() {
            return Err(Error::invalid_path("cannot write to the root path"));
        }
        let mode = opts.mode.unwrap_or(MODE_BLOB);

        let mut plan = Plan::new();
        plan.writes
            .insert(path, PendingWrite::from_bytes(data.to_vec(), mode)?);
        self.commit_plan(plan, opts.message, None, ChangeReport::new(), false)
    }

    /// Write UTF-8 text to `path`.
    pub fn write_text(&self, path: &str, text: &str, opts: WriteOptions) -> Result<Snapshot> {
        self.write(path, text.as_bytes(), opts)
    }

    /// Import a local file at `path`, preserving symlink-ness and the
    /// executable bit unless `opts.mode` overrides.
    pub fn write_from_file(&self, path: &str, src: &Path, opts: WriteOptions) -> Result<Snapshot> {
        let mode = match opts.mode {
            Some(m) => m,
            None => tree::mode_from_disk(src)?,
        };
        let data = if mode == MODE_LINK {
            let target = std::fs::read_link(src).map_err(|e| Error::io(src, e))?;
            target.to_string_lossy().into_owned().into_bytes()
        } else {
            std::fs::read(src).map_err(|e| Error::io(src, e))?
        };
        self.write(
            path,
            &data,
            WriteOptions {
                mode: Some(mode),
                ..opts
            },
        )
    }

    /// Create a symlink entry at `path` pointing at `target`.
    pub fn write_symlink(&self, path: &str, target: &str, opts: WriteOptions) -> Result<Snapshot> {
        self.write(
            path,
            target.as_bytes(),
            WriteOptions {
                mode: Some(MODE_LINK),
                ..opts
            },
        )
    }

    /// Apply a set of writes and removes in one commit.
    ///
    /// The two lists are independent; a path named in both resolves to the
    /// remove. Removes of absent paths are ignored here (unlike
    /// [`remove`](Self::remove)).
    pub fn apply(
        &self,
        writes: &[(&str, WriteEntry)],
        removes: &[&str],
        opts: ApplyOptions,
    ) -> Result<Snapshot> {
        self.require_writable("write to")?;

        let mut plan = Plan::new();
        for (raw, entry) in writes {
            let path = crate::path::normalize(raw)?;
            if path.is_empty() {
                return Err(Error::invalid_path("cannot write to the root path"));
            }
            let pw = match entry {
                WriteEntry::Data { bytes, mode } => {
                    PendingWrite::from_bytes(bytes.clone(), mode.unwrap_or(MODE_BLOB))?
                }
                WriteEntry::Symlink { target } => {
                    PendingWrite::from_bytes(target.as_bytes().to_vec(), MODE_LINK)?
                }
                WriteEntry::PreHashed { oid, mode } => {
                    PendingWrite::from_existing(*oid, mode.unwrap_or(MODE_BLOB))
                }
            };
            plan.writes.insert(path, pw);
        }
        for raw in removes {
            let path = crate::path::normalize(raw)?;
            let node = self.with_repo(|repo| tree::lookup(repo, self.tree_oid, &path))?;
            match node {
                Some(n) if n.is_tree() => {
                    let leaves =
                        self.with_repo(|repo| tree::files_under(repo, self.tree_oid, &path))?;
                    for rel in leaves.keys() {
                        plan.removes.insert(crate::path::join(&path, rel));
                    }
                }
                _ => {
                    plan.removes.insert(path);
                }
            }
        }

        self.commit_plan(
            plan,
            opts.message,
            opts.operation.as_deref(),
            ChangeReport::new(),
            false,
        )
    }

    /// A fresh [`Batch`] accumulating writes over this snapshot.
    pub fn batch(&self, opts: BatchOptions) -> Batch {
        Batch::new(self.clone(), opts)
    }

    /// Run `f` against a batch and commit it on success: the scoped form
    /// of [`batch`](Self::batch) that cannot leak an uncommitted batch.
    pub fn with_batch<F>(&self, opts: BatchOptions, f: F) -> Result<Snapshot>
    where
        F: FnOnce(&mut Batch) -> Result<()>,
    {
        let mut batch = self.batch(opts);
        f(&mut batch)?;
        batch.commit()
    }

    /// A buffered writer that commits a single write to `path` on close.
    pub fn writer(&self, path: &str) -> Result<crate::writer::SnapshotWriter> {
        self.require_writable("write to")?;
        let path = crate::path::normalize(path)?;
        Ok(crate::writer::SnapshotWriter::new(self.clone(), path))
    }

    /// Remove files (or, with `recursive`, directories) in one commit.
    ///
    /// # Errors
    /// [`Error::NotFound`] for absent paths, [`Error::IsADirectory`] for a
    /// directory without `recursive`.
    pub fn remove(&self, paths: &[&str], opts: RemoveOptions) -> Result<Snapshot> {
        self.require_writable("remove from")?;

        let mut plan = Plan::new();
        self.with_repo(|repo| {
            for raw in paths {
                let path = crate::path::normalize(raw)?;
                let node = tree::lookup(repo, self.tree_oid, &path)?
                    .ok_or_else(|| Error::not_found(&path))?;
                if node.is_tree() {
                    if !opts.recursive {
                        return Err(Error::is_a_directory(&path));
                    }
                    for (rel, _) in tree::walk_files(repo, node.oid)? {
                        plan.removes.insert(crate::path::join(&path, &rel));
                    }
                } else {
                    plan.removes.insert(path);
                }
            }
            Ok(())
        })?;

        self.commit_plan(
            plan,
            opts.message,
            Some("remove"),
            ChangeReport::new(),
            opts.dry_run,
        )
    }

    /// Rename `src` to `dest` (file or, with `recursive`, directory) in
    /// one commit.
    pub fn rename(&self, src: &str, dest: &str, opts: MoveOptions) -> Result<Snapshot> {
        self.require_writable("rename in")?;
        let plan = self.with_repo(|repo| {
            copy::plan_rename(repo, self.tree_oid, src, dest, opts.recursive)
        })?;
        self.commit_plan(
            plan,
            opts.message,
            Some("rename"),
            ChangeReport::new(),
            opts.dry_run,
        )
    }

    /// Move one or more paths to `dest` with POSIX `mv` semantics: more
    /// than one source requires `dest` to be an existing directory or to
    /// end in `/`.
    pub fn move_paths(&self, sources: &[&str], dest: &str, opts: MoveOptions) -> Result<Snapshot> {
        self.require_writable("move in")?;
        let plan = self.with_repo(|repo| {
            copy::plan_move(repo, self.tree_oid, sources, dest, opts.recursive)
        })?;
        self.commit_plan(
            plan,
            opts.message,
            Some("move"),
            ChangeReport::new(),
            opts.dry_run,
        )
    }

    /// Import local files into the tree in one commit. See
    /// [`CopyInOptions`] for trailing-separator, delete, and filter
    /// semantics.
    pub fn copy_in(&self, sources: &[&str], dest: &str, opts: CopyInOptions) -> Result<Snapshot> {
        self.require_writable("copy into")?;
        let (plan, extra) = self.with_repo(|repo| {
            copy::plan_copy_in(repo, self.tree_oid, sources, dest, &opts)
        })?;
        self.commit_plan(
            plan,
            opts.message.clone(),
            Some("copy_in"),
            extra,
            opts.dry_run,
        )
    }

    /// Export paths from the tree to a local directory. Does not change
    /// the store.
    pub fn copy_out(&self, sources: &[&str], dest: &Path, opts: CopyOutOptions) -> Result<ChangeReport> {
        let mtime = self.time()?;
        self.with_repo(|repo| copy::copy_out(repo, self.tree_oid, sources, dest, &opts, mtime))
    }

    /// Make the subtree at `dest` identical to the local directory `src`
    /// (copy with deletes) in one commit.
    pub fn sync_in(&self, src: &Path, dest: &str, opts: SyncOptions) -> Result<Snapshot> {
        self.require_writable("sync into")?;
        let contents = format!("{}/", src.to_string_lossy().trim_end_matches('/'));
        let copy_opts = CopyInOptions {
            include: opts.include.clone(),
            exclude: opts.exclude.clone(),
            exclude_filter: opts.exclude_filter.clone(),
            message: opts.message.clone(),
            dry_run: opts.dry_run,
            delete: true,
            ignore_existing: false,
            ignore_errors: opts.ignore_errors,
            follow_symlinks: opts.follow_symlinks,
            checksum: opts.checksum,
        };
        let (plan, extra) = self.with_repo(|repo| {
            copy::plan_copy_in(repo, self.tree_oid, &[contents.as_str()], dest, &copy_opts)
        })?;
        self.commit_plan(plan, opts.message, Some("sync_in"), extra, opts.dry_run)
    }

    /// Make the local directory `dest` identical to the subtree at `src`
    /// (export with deletes and empty-directory pruning).
    pub fn sync_out(&self, src: &str, dest: &Path, opts: SyncOptions) -> Result<ChangeReport> {
        let mtime = self.time()?;
        let contents = format!("{}/", src.trim_end_matches('/'));
        let copy_opts = CopyOutOptions {
            include: opts.include.clone(),
            exclude: opts.exclude.clone(),
            delete: true,
            dry_run: opts.dry_run,
            ignore_errors: opts.ignore_errors,
            checksum: opts.checksum,
        };
        self.with_repo(|repo| {
            copy::copy_out(repo, self.tree_oid, &[contents.as_str()], dest, &copy_opts, mtime)
        })
    }

    /// Copy paths from another snapshot of the *same* repository into this
    /// branch, referencing existing blob ids (no content is re-read).
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] when `source` belongs to a different
    /// repository.
    pub fn copy_from_ref(
        &self,
        source: &Snapshot,
        sources: &[&str],
        dest: &str,
        opts: CopyFromRefOptions,
    ) -> Result<Snapshot> {
        self.require_writable("copy into")?;
        self.require_same_store(source)?;

        let plan = self.with_repo(|repo| {
            copy::plan_copy_from_ref(
                repo,
                source.tree_oid,
                self.tree_oid,
                sources,
                dest,
                opts.delete,
            )
        })?;
        self.commit_plan(
            plan,
            opts.message.clone(),
            Some("copy"),
            ChangeReport::new(),
            opts.dry_run,
        )
    }

    fn require_same_store(&self, other: &Snapshot) -> Result<()> {
        if Arc::ptr_eq(&self.shared, &other.shared) {
            return Ok(());
        }
        let ours = std::fs::canonicalize(&self.shared.path).ok();
        let theirs = std::fs::canonicalize(&other.shared.path).ok();
        if ours.is_some() && ours == theirs {
            return Ok(());
        }
        Err(Error::invalid_argument(
            "snapshots belong to different repositories",
        ))
    }

    // -- Internal -----------------------------------------------------------

    /// Run one transaction (or, for a dry run, classify the plan) and
    /// produce the resulting snapshot with its change report attached.
    pub(crate) fn commit_plan(
        &self,
        plan: Plan,
        message: Option<String>,
        operation: Option<&str>,
        extra: ChangeReport,
        dry_run: bool,
    ) -> Result<Snapshot> {
        let branch = self.require_writable("commit to")?.to_string();

        if dry_run {
            let mut report =
                self.with_repo(|repo| crate::diff::report_for_plan(repo, self.tree_oid, &plan))?;
            report.errors.extend(extra.errors);
            report.warnings.extend(extra.warnings);
            let mut preview = self.clone();
            preview.changes = Some(report);
            return Ok(preview);
        }

        let outcome = update::advance(
            &self.shared,
            &branch,
            self.commit_oid,
            self.tree_oid,
            &plan,
            message,
            operation,
            extra,
        )?;

        Ok(Snapshot {
            shared: Arc::clone(&self.shared),
            commit_oid: outcome.commit_oid,
            tree_oid: outcome.tree_oid,
            ref_name: self.ref_name.clone(),
            writable: self.writable,
            changes: Some(outcome.report),
        })
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hash = self.commit_oid.to_string();
        let short = &hash[..7.min(hash.len())];
        match (&self.ref_name, self.writable) {
            (Some(name), true) => write!(f, "Snapshot({} @ {})", name, short),
            (Some(name), false) => write!(f, "Snapshot({} @ {}, readonly)", name, short),
            (None, _) => write!(f, "Snapshot({}, detached)", short),
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Lazy first-parent history walk; see [`Snapshot::log`].
pub struct History {
    shared: Arc<StoreShared>,
    next: Option<git2::Oid>,
    path: Option<String>,
    pattern: Option<String>,
    before: Option<u64>,
}

struct HistoryStep {
    tree_oid: git2::Oid,
    parent: Option<git2::Oid>,
    include: bool,
}

impl History {
    fn step(&self, oid: git2::Oid) -> Result<HistoryStep> {
        self.shared.with_repo(|repo| {
            let commit = repo.find_commit(oid).map_err(Error::git)?;
            let tree_oid = commit.tree_id();
            let parent = if commit.parent_count() == 0 {
                None
            } else {
                Some(commit.parent_id(0).map_err(Error::git)?)
            };

            let mut include = true;

            if let Some(cutoff) = self.before {
                include &= commit.time().seconds().max(0) as u64 <= cutoff;
            }

            if include {
                if let Some(pattern) = &self.pattern {
                    let message = commit.message().unwrap_or("");
                    include &= crate::glob::fnmatch(pattern.as_bytes(), message.as_bytes());
                }
            }

            if include {
                if let Some(path) = &self.path {
                    let here = tree::lookup(repo, tree_oid, path)?;
                    let there = match parent {
                        Some(pid) => {
                            let parent_commit = repo.find_commit(pid).map_err(Error::git)?;
                            tree::lookup(repo, parent_commit.tree_id(), path)?
                        }
                        None => None,
                    };
                    include &= here != there;
                }
            }

            Ok(HistoryStep {
                tree_oid,
                parent,
                include,
            })
        })
    }
}

impl Iterator for History {
    type Item = Result<Snapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let oid = self.next.take()?;
            match self.step(oid) {
                Err(e) => return Some(Err(e)),
                Ok(step) => {
                    self.next = step.parent;
                    if step.include {
                        return Some(Ok(Snapshot {
                            shared: Arc::clone(&self.shared),
                            commit_oid: oid,
                            tree_oid: step.tree_oid,
                            ref_name: None,
                            writable: false,
                            changes: None,
                        }));
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Retry helper
// ---------------------------------------------------------------------------

/// Re-run `f` on [`Error::StaleSnapshot`], up to `max_attempts` total
/// attempts, with bounded exponential backoff. The closure should re-fetch
/// the branch snapshot on each attempt.
pub fn retry_write<T, F>(max_attempts: u32, mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Err(Error::StaleSnapshot(_)) if attempt + 1 < max_attempts => {
                let backoff = std::time::Duration::from_millis((10 * 2u64.pow(attempt)).min(200));
                std::thread::sleep(backoff);
                attempt += 1;
            }
            other => return other,
        }
    }
}
