//! Copy, sync, and move planning.
//!
//! Disk-to-tree operations build a [`Plan`] that the snapshot layer runs
//! through the ref updater (one commit, or a dry-run report). Tree-to-disk
//! operations execute directly and return a [`ChangeReport`]. Source paths
//! follow rsync-style trailing-separator semantics: `"dir"` copies the
//! directory itself under the destination, `"dir/"` copies its contents.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::exclude::ExcludeFilter;
use crate::tree::{self, Node};
use crate::types::{
    ChangeReport, FileEntry, FileType, PathError, MODE_BLOB, MODE_BLOB_EXEC, MODE_LINK,
};
use crate::update::{PendingWrite, Plan};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options for [`Snapshot::copy_in`](crate::Snapshot::copy_in).
#[derive(Debug, Clone)]
pub struct CopyInOptions {
    /// Glob patterns; when set, only matching files are copied.
    pub include: Option<Vec<String>>,
    /// Glob patterns; matching files are skipped.
    pub exclude: Option<Vec<String>>,
    /// Gitignore-style filter applied during disk enumeration (prunes
    /// whole directories).
    pub exclude_filter: Option<ExcludeFilter>,
    /// Commit message; derived from the change report if unset.
    pub message: Option<String>,
    /// Report what would change without writing anything.
    pub dry_run: bool,
    /// Remove files under the destination that the copy did not touch.
    pub delete: bool,
    /// Skip files that already exist in the base tree.
    pub ignore_existing: bool,
    /// Record unreadable sources in `ChangeReport::errors` instead of
    /// failing.
    pub ignore_errors: bool,
    /// Store the content symlinks point at instead of the links.
    pub follow_symlinks: bool,
    /// Skip files whose staged blob id and mode match the existing entry.
    pub checksum: bool,
}

impl Default for CopyInOptions {
    fn default() -> Self {
        Self {
            include: None,
            exclude: None,
            exclude_filter: None,
            message: None,
            dry_run: false,
            delete: false,
            ignore_existing: false,
            ignore_errors: false,
            follow_symlinks: false,
            checksum: true,
        }
    }
}

/// Options for [`Snapshot::copy_out`](crate::Snapshot::copy_out).
#[derive(Debug, Clone)]
pub struct CopyOutOptions {
    /// Glob patterns; when set, only matching files are exported.
    pub include: Option<Vec<String>>,
    /// Glob patterns; matching files are skipped.
    pub exclude: Option<Vec<String>>,
    /// Remove local files under the destination that the copy did not
    /// produce, pruning directories left empty.
    pub delete: bool,
    /// Report what would change without touching the disk.
    pub dry_run: bool,
    /// Record per-file I/O failures instead of failing.
    pub ignore_errors: bool,
    /// Skip files whose on-disk content already matches.
    pub checksum: bool,
}

impl Default for CopyOutOptions {
    fn default() -> Self {
        Self {
            include: None,
            exclude: None,
            delete: false,
            dry_run: false,
            ignore_errors: false,
            checksum: true,
        }
    }
}

/// Options for [`Snapshot::sync_in`](crate::Snapshot::sync_in) and
/// [`Snapshot::sync_out`](crate::Snapshot::sync_out).
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Glob patterns; when set, only matching files are synced.
    pub include: Option<Vec<String>>,
    /// Glob patterns; matching files are skipped.
    pub exclude: Option<Vec<String>>,
    /// Gitignore-style filter (sync_in only).
    pub exclude_filter: Option<ExcludeFilter>,
    /// Commit message (sync_in only); derived if unset.
    pub message: Option<String>,
    /// Report what would change without writing anything.
    pub dry_run: bool,
    /// Record per-file failures instead of failing.
    pub ignore_errors: bool,
    /// Follow symlinks instead of storing them (sync_in only).
    pub follow_symlinks: bool,
    /// Skip unchanged files.
    pub checksum: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            include: None,
            exclude: None,
            exclude_filter: None,
            message: None,
            dry_run: false,
            ignore_errors: false,
            follow_symlinks: false,
            checksum: true,
        }
    }
}

/// Options for [`Snapshot::copy_from_ref`](crate::Snapshot::copy_from_ref).
#[derive(Debug, Clone, Default)]
pub struct CopyFromRefOptions {
    /// Remove destination files absent from the source.
    pub delete: bool,
    /// Report what would change without writing anything.
    pub dry_run: bool,
    /// Commit message; derived from the change report if unset.
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Disk enumeration
// ---------------------------------------------------------------------------

/// Recursively list the files under `root` (relative forward-slash paths,
/// sorted), filtered by optional include/exclude glob patterns.
pub fn disk_glob(
    root: &Path,
    include: Option<&[String]>,
    exclude: Option<&[String]>,
) -> Result<Vec<String>> {
    let mut files = walk_disk(root, None)?;
    files.retain(|p| matches_filters(p, include, exclude));
    files.sort();
    Ok(files)
}

/// Walk `root` collecting relative file paths. Directories excluded by
/// `filter` are pruned without descending.
fn walk_disk(root: &Path, filter: Option<&ExcludeFilter>) -> Result<Vec<String>> {
    let mut out = Vec::new();
    walk_disk_into(root, "", filter, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk_disk_into(
    dir: &Path,
    prefix: &str,
    filter: Option<&ExcludeFilter>,
    out: &mut Vec<String>,
) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(dir, e)),
    };

    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = crate::path::join(prefix, &name);
        let meta = std::fs::symlink_metadata(entry.path())
            .map_err(|e| Error::io(entry.path(), e))?;

        if meta.is_dir() {
            if filter.map_or(false, |f| f.is_excluded(&rel, true)) {
                continue;
            }
            walk_disk_into(&entry.path(), &rel, filter, out)?;
        } else {
            if filter.map_or(false, |f| f.is_excluded(&rel, false)) {
                continue;
            }
            out.push(rel);
        }
    }
    Ok(())
}

fn matches_filters(path: &str, include: Option<&[String]>, exclude: Option<&[String]>) -> bool {
    if let Some(patterns) = include {
        if !patterns.iter().any(|p| path_matches(path, p)) {
            return false;
        }
    }
    if let Some(patterns) = exclude {
        if patterns.iter().any(|p| path_matches(path, p)) {
            return false;
        }
    }
    true
}

/// A pattern matches either the basename or the full relative path.
fn path_matches(path: &str, pattern: &str) -> bool {
    crate::glob::glob_match(pattern, crate::path::basename(path))
        || crate::glob::glob_match(pattern, path)
}

// ---------------------------------------------------------------------------
// copy_in planning
// ---------------------------------------------------------------------------

/// Build the plan for importing local `sources` under `dest`.
///
/// Returns the plan plus a report carrying only planner-collected errors
/// and warnings; add/update/delete classification happens when the plan is
/// committed (or previewed for a dry run).
pub(crate) fn plan_copy_in(
    repo: &git2::Repository,
    base_tree: git2::Oid,
    sources: &[&str],
    dest: &str,
    opts: &CopyInOptions,
) -> Result<(Plan, ChangeReport)> {
    let dest_norm = crate::path::normalize(dest)?;
    let mut plan = Plan::new();
    let mut extra = ChangeReport::new();
    // Everything the copy laid claim to, including files skipped as
    // unchanged; `delete` must not reap these.
    let mut touched: BTreeSet<String> = BTreeSet::new();

    for &source in sources {
        let contents_mode = source.ends_with('/');
        let trimmed = source.trim_end_matches('/');
        let disk: &Path = if trimmed.is_empty() {
            Path::new("/")
        } else {
            Path::new(trimmed)
        };

        let meta = match std::fs::symlink_metadata(disk) {
            Ok(m) => m,
            Err(e) => {
                per_file_error(&mut extra, opts.ignore_errors, source, Error::io(disk, e))?;
                continue;
            }
        };

        if !meta.is_dir() {
            let name = disk
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::invalid_argument(format!("bad source path {:?}", source)))?;
            let target = crate::path::join(&dest_norm, &name);
            stage_disk_file(
                repo, base_tree, &mut plan, &mut extra, &mut touched, disk, &target, opts,
            )?;
            continue;
        }

        let base_target = if contents_mode {
            dest_norm.clone()
        } else {
            let name = disk
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::invalid_argument(format!("bad source path {:?}", source)))?;
            crate::path::join(&dest_norm, &name)
        };

        let rels = match walk_disk(disk, opts.exclude_filter.as_ref()) {
            Ok(r) => r,
            Err(e) => {
                per_file_error(&mut extra, opts.ignore_errors, source, e)?;
                continue;
            }
        };

        for rel in rels {
            if !matches_filters(&rel, opts.include.as_deref(), opts.exclude.as_deref()) {
                continue;
            }
            let full_disk = disk.join(&rel);
            let target = crate::path::join(&base_target, &rel);
            stage_disk_file(
                repo, base_tree, &mut plan, &mut extra, &mut touched, &full_disk, &target, opts,
            )?;
        }
    }

    if opts.delete {
        for (rel, _) in tree::files_under(repo, base_tree, &dest_norm)? {
            let full = crate::path::join(&dest_norm, &rel);
            if touched.contains(&full) {
                continue;
            }
            // Filters shield existing entries from deletion too.
            if !matches_filters(&rel, opts.include.as_deref(), opts.exclude.as_deref()) {
                continue;
            }
            if let Some(f) = &opts.exclude_filter {
                if f.is_excluded(&rel, false) {
                    continue;
                }
            }
            plan.removes.insert(full);
        }
    }

    Ok((plan, extra))
}

/// Read one disk file and stage it, honoring symlink, executable-bit,
/// ignore-existing, and checksum rules.
#[allow(clippy::too_many_arguments)]
fn stage_disk_file(
    repo: &git2::Repository,
    base_tree: git2::Oid,
    plan: &mut Plan,
    extra: &mut ChangeReport,
    touched: &mut BTreeSet<String>,
    disk: &Path,
    target: &str,
    opts: &CopyInOptions,
) -> Result<()> {
    let staged = match read_disk_entry(disk, opts.follow_symlinks) {
        Ok(s) => s,
        Err(e) => return per_file_error(extra, opts.ignore_errors, target, e),
    };
    touched.insert(target.to_string());

    let existing = tree::lookup(repo, base_tree, target)?;
    if opts.ignore_existing && existing.is_some() {
        return Ok(());
    }

    let pw = PendingWrite::from_bytes(staged.data, staged.mode)?;
    if opts.checksum {
        if let Some(node) = existing {
            if node.oid == pw.oid && node.mode == pw.mode {
                return Ok(());
            }
        }
    }
    log::trace!("copy_in: staging {} ({:o})", target, staged.mode);
    plan.writes.insert(target.to_string(), pw);
    Ok(())
}

struct DiskEntry {
    data: Vec<u8>,
    mode: u32,
}

/// Read a file, symlink, or (with `follow`) symlink target from disk.
fn read_disk_entry(disk: &Path, follow: bool) -> Result<DiskEntry> {
    let mode = tree::mode_from_disk(disk)?;
    if mode == MODE_LINK && !follow {
        let target = std::fs::read_link(disk).map_err(|e| Error::io(disk, e))?;
        return Ok(DiskEntry {
            data: target.to_string_lossy().into_owned().into_bytes(),
            mode: MODE_LINK,
        });
    }
    if mode == MODE_LINK {
        // Following: a dangling link surfaces here as an I/O error.
        let meta = std::fs::metadata(disk).map_err(|e| Error::io(disk, e))?;
        let data = std::fs::read(disk).map_err(|e| Error::io(disk, e))?;
        let mode = {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if meta.permissions().mode() & 0o111 != 0 {
                    MODE_BLOB_EXEC
                } else {
                    MODE_BLOB
                }
            }
            #[cfg(not(unix))]
            {
                let _ = meta;
                MODE_BLOB
            }
        };
        return Ok(DiskEntry { data, mode });
    }
    let data = std::fs::read(disk).map_err(|e| Error::io(disk, e))?;
    Ok(DiskEntry { data, mode })
}

fn per_file_error(
    extra: &mut ChangeReport,
    ignore_errors: bool,
    path: &str,
    err: Error,
) -> Result<()> {
    if ignore_errors {
        log::trace!("copy: skipping {}: {}", path, err);
        extra.errors.push(PathError::new(path, err.to_string()));
        Ok(())
    } else {
        Err(err)
    }
}

// ---------------------------------------------------------------------------
// copy_out execution
// ---------------------------------------------------------------------------

/// Export `sources` from the tree to the local directory `dest`.
pub(crate) fn copy_out(
    repo: &git2::Repository,
    tree_oid: git2::Oid,
    sources: &[&str],
    dest: &Path,
    opts: &CopyOutOptions,
    mtime: u64,
) -> Result<ChangeReport> {
    let mut report = ChangeReport::new();

    // Destination-relative output map.
    let mut outputs: BTreeMap<String, Node> = BTreeMap::new();
    for &source in sources {
        let contents_mode = source.ends_with('/');
        let norm = crate::path::normalize(source.trim_end_matches('/'))?;

        if norm.is_empty() {
            for (rel, node) in tree::files_under(repo, tree_oid, "")? {
                outputs.insert(rel, node);
            }
            continue;
        }

        let node = tree::lookup(repo, tree_oid, &norm)?
            .ok_or_else(|| Error::not_found(format!("not in the store: {}", norm)))?;
        if node.is_tree() {
            let base_rel = if contents_mode {
                String::new()
            } else {
                crate::path::basename(&norm).to_string()
            };
            for (rel, entry) in tree::walk_files(repo, node.oid)? {
                outputs.insert(
                    crate::path::join(&base_rel, &rel),
                    Node {
                        oid: entry.oid,
                        mode: entry.mode,
                    },
                );
            }
        } else {
            if contents_mode {
                return Err(Error::not_a_directory(&norm));
            }
            outputs.insert(crate::path::basename(&norm).to_string(), node);
        }
    }

    for (rel, node) in &outputs {
        if !matches_filters(rel, opts.include.as_deref(), opts.exclude.as_deref()) {
            continue;
        }
        if let Err(e) = export_one(repo, rel, *node, dest, opts, mtime, &mut report) {
            per_file_error(&mut report, opts.ignore_errors, rel, e)?;
        }
    }

    if opts.delete {
        let on_disk = walk_disk(dest, None)?;
        for rel in on_disk {
            if !matches_filters(&rel, opts.include.as_deref(), opts.exclude.as_deref()) {
                continue;
            }
            if outputs.contains_key(&rel) {
                continue;
            }
            let full = dest.join(&rel);
            if !opts.dry_run {
                std::fs::remove_file(&full).map_err(|e| Error::io(&full, e))?;
            }
            report
                .delete
                .push(FileEntry::with_src(&rel, FileType::Blob, &full));
        }
        if !opts.dry_run {
            prune_empty_dirs(dest)?;
        }
    }

    Ok(report)
}

fn export_one(
    repo: &git2::Repository,
    rel: &str,
    node: Node,
    dest: &Path,
    opts: &CopyOutOptions,
    mtime: u64,
    report: &mut ChangeReport,
) -> Result<()> {
    let target = dest.join(rel);
    let blob = repo.find_blob(node.oid).map_err(Error::git)?;
    let on_disk = target.symlink_metadata().is_ok();

    if on_disk && opts.checksum && disk_matches(&target, node)? {
        return Ok(());
    }

    let file_type = FileType::from_mode(node.mode).unwrap_or(FileType::Blob);
    if !opts.dry_run {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        if node.mode == MODE_LINK {
            let link_target = String::from_utf8_lossy(blob.content()).into_owned();
            #[cfg(unix)]
            {
                let _ = std::fs::remove_file(&target);
                std::os::unix::fs::symlink(&link_target, &target)
                    .map_err(|e| Error::io(&target, e))?;
            }
            #[cfg(not(unix))]
            std::fs::write(&target, link_target.as_bytes()).map_err(|e| Error::io(&target, e))?;
        } else {
            std::fs::write(&target, blob.content()).map_err(|e| Error::io(&target, e))?;

            #[cfg(unix)]
            if node.mode == MODE_BLOB_EXEC {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755))
                    .map_err(|e| Error::io(&target, e))?;
            }

            let ft = filetime::FileTime::from_unix_time(mtime as i64, 0);
            filetime::set_file_mtime(&target, ft).map_err(|e| Error::io(&target, e))?;
        }
    }

    let entry = FileEntry::with_src(rel, file_type, &target);
    if on_disk {
        report.update.push(entry);
    } else {
        report.add.push(entry);
    }
    Ok(())
}

/// Whether the on-disk file already matches the tree node (content and
/// link-ness).
fn disk_matches(target: &Path, node: Node) -> Result<bool> {
    let meta = match target.symlink_metadata() {
        Ok(m) => m,
        Err(_) => return Ok(false),
    };
    let disk_is_link = meta.file_type().is_symlink();
    if disk_is_link != (node.mode == MODE_LINK) {
        return Ok(false);
    }
    let data = if disk_is_link {
        match std::fs::read_link(target) {
            Ok(t) => t.to_string_lossy().into_owned().into_bytes(),
            Err(_) => return Ok(false),
        }
    } else {
        match std::fs::read(target) {
            Ok(d) => d,
            Err(_) => return Ok(false),
        }
    };
    let oid = git2::Oid::hash_object(git2::ObjectType::Blob, &data).map_err(Error::git)?;
    Ok(oid == node.oid)
}

/// Remove directories left empty under `root`, deepest first.
fn prune_empty_dirs(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Ok(());
    }
    let mut dirs: Vec<PathBuf> = Vec::new();
    collect_dirs(root, &mut dirs)?;
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        // Fails (and is ignored) when the directory still has content.
        let _ = std::fs::remove_dir(&dir);
    }
    Ok(())
}

fn collect_dirs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(_) => return Ok(()),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.push(path.clone());
            collect_dirs(&path, out)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// rename / move planning
// ---------------------------------------------------------------------------

/// Plan renaming `src` to the exact path `dest`.
pub(crate) fn plan_rename(
    repo: &git2::Repository,
    base_tree: git2::Oid,
    src: &str,
    dest: &str,
    recursive: bool,
) -> Result<Plan> {
    let src_norm = crate::path::normalize(src)?;
    let dest_norm = crate::path::normalize(dest)?;
    if src_norm.is_empty() || dest_norm.is_empty() {
        return Err(Error::invalid_argument("cannot rename to or from the root"));
    }
    check_distinct(&src_norm, &dest_norm)?;

    let node = tree::require(repo, base_tree, &src_norm)?;
    let mut plan = Plan::new();
    relocate(repo, &mut plan, &src_norm, &dest_norm, node, recursive)?;
    Ok(plan)
}

/// Plan moving `sources` to `dest` with POSIX `mv` semantics: the
/// destination is treated as a directory when it exists as one or when it
/// ends with `/`; multiple sources require a directory destination.
pub(crate) fn plan_move(
    repo: &git2::Repository,
    base_tree: git2::Oid,
    sources: &[&str],
    dest: &str,
    recursive: bool,
) -> Result<Plan> {
    let dest_trailing = dest.ends_with('/');
    let dest_norm = crate::path::normalize(dest)?;

    let dest_is_dir = dest_norm.is_empty()
        || dest_trailing
        || matches!(
            tree::lookup(repo, base_tree, &dest_norm)?,
            Some(node) if node.is_tree()
        );

    if sources.len() > 1 && !dest_is_dir {
        return Err(Error::not_a_directory(&dest_norm));
    }

    let mut plan = Plan::new();
    for &src in sources {
        let src_norm = crate::path::normalize(src)?;
        if src_norm.is_empty() {
            return Err(Error::invalid_argument("cannot move the root"));
        }
        let node = tree::require(repo, base_tree, &src_norm)?;

        let target = if dest_is_dir {
            crate::path::join(&dest_norm, crate::path::basename(&src_norm))
        } else {
            dest_norm.clone()
        };
        check_distinct(&src_norm, &target)?;
        relocate(repo, &mut plan, &src_norm, &target, node, recursive)?;
    }
    Ok(plan)
}

fn check_distinct(src: &str, dest: &str) -> Result<()> {
    if src == dest {
        return Err(Error::invalid_argument(format!(
            "cannot move {:?} onto itself",
            src
        )));
    }
    if dest.starts_with(&format!("{}/", src)) {
        return Err(Error::invalid_argument(format!(
            "cannot move {:?} into itself",
            src
        )));
    }
    Ok(())
}

/// Stage `src -> dest` as removes plus pre-hashed writes.
fn relocate(
    repo: &git2::Repository,
    plan: &mut Plan,
    src: &str,
    dest: &str,
    node: Node,
    recursive: bool,
) -> Result<()> {
    if node.is_tree() {
        if !recursive {
            return Err(Error::is_a_directory(src));
        }
        for (rel, entry) in tree::walk_files(repo, node.oid)? {
            plan.removes.insert(crate::path::join(src, &rel));
            plan.writes.insert(
                crate::path::join(dest, &rel),
                PendingWrite::from_existing(entry.oid, entry.mode),
            );
        }
    } else {
        plan.removes.insert(src.to_string());
        plan.writes.insert(
            dest.to_string(),
            PendingWrite::from_existing(node.oid, node.mode),
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// copy_from_ref planning
// ---------------------------------------------------------------------------

/// Plan a zero-copy transfer of `sources` in `src_tree` under `dest` in
/// `dest_tree`. Writes reference the source blob ids; with `delete`,
/// destination files absent from the mapped sources are removed.
pub(crate) fn plan_copy_from_ref(
    repo: &git2::Repository,
    src_tree: git2::Oid,
    dest_tree: git2::Oid,
    sources: &[&str],
    dest: &str,
    delete: bool,
) -> Result<Plan> {
    let dest_norm = crate::path::normalize(dest)?;

    let mut mapped: BTreeMap<String, Node> = BTreeMap::new();
    let mut scopes: BTreeSet<String> = BTreeSet::new();

    for &source in sources {
        let contents_mode = source.ends_with('/');
        let norm = crate::path::normalize(source.trim_end_matches('/'))?;

        if norm.is_empty() || contents_mode {
            if !norm.is_empty() {
                match tree::lookup(repo, src_tree, &norm)? {
                    Some(node) if node.is_tree() => {}
                    Some(_) => return Err(Error::not_a_directory(&norm)),
                    None => {
                        return Err(Error::not_found(format!("not in the store: {}", norm)))
                    }
                }
            }
            for (rel, node) in tree::files_under(repo, src_tree, &norm)? {
                mapped.insert(crate::path::join(&dest_norm, &rel), node);
            }
            scopes.insert(dest_norm.clone());
            continue;
        }

        let node = tree::lookup(repo, src_tree, &norm)?
            .ok_or_else(|| Error::not_found(format!("not in the store: {}", norm)))?;
        if node.is_tree() {
            let target = crate::path::join(&dest_norm, crate::path::basename(&norm));
            for (rel, sub) in tree::files_under(repo, src_tree, &norm)? {
                mapped.insert(crate::path::join(&target, &rel), sub);
            }
            scopes.insert(target);
        } else {
            mapped.insert(
                crate::path::join(&dest_norm, crate::path::basename(&norm)),
                node,
            );
            scopes.insert(dest_norm.clone());
        }
    }

    let mut existing: BTreeMap<String, Node> = BTreeMap::new();
    for scope in &scopes {
        for (rel, node) in tree::files_under(repo, dest_tree, scope)? {
            existing.insert(crate::path::join(scope, &rel), node);
        }
    }

    let mut plan = Plan::new();
    for (path, node) in &mapped {
        match existing.get(path) {
            Some(have) if have == node => {}
            _ => {
                plan.writes
                    .insert(path.clone(), PendingWrite::from_existing(node.oid, node.mode));
            }
        }
    }
    if delete {
        for path in existing.keys() {
            if !mapped.contains_key(path) {
                plan.removes.insert(path.clone());
            }
        }
    }

    Ok(plan)
}
