//! The tree engine: pure functions over the object database.
//!
//! Read operations take a root tree id and a canonical path (already
//! normalized by the caller). The write side is [`apply_plan`], which
//! rebuilds only the ancestor chain of the touched paths: untouched sibling
//! subtrees are reused by object id, so structural sharing falls out of
//! content addressing.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{TreeEntry, WalkDir, MODE_BLOB, MODE_BLOB_EXEC, MODE_LINK, MODE_TREE};

/// `(oid, mode)` of a resolved tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Node {
    pub oid: git2::Oid,
    pub mode: u32,
}

impl Node {
    pub fn is_tree(&self) -> bool {
        self.mode == MODE_TREE
    }
}

/// Resolve the entry at `path` under `root`, or `None` when any segment is
/// missing or an intermediate entry is not a tree. The empty path resolves
/// to the root tree itself.
pub(crate) fn lookup(
    repo: &git2::Repository,
    root: git2::Oid,
    path: &str,
) -> Result<Option<Node>> {
    if path.is_empty() {
        return Ok(Some(Node {
            oid: root,
            mode: MODE_TREE,
        }));
    }

    let mut current = root;
    let mut segments = path.split('/').peekable();
    while let Some(seg) = segments.next() {
        let tree = repo.find_tree(current).map_err(Error::git)?;
        let Some(entry) = tree.get_name(seg) else {
            return Ok(None);
        };
        let node = Node {
            oid: entry.id(),
            mode: entry.filemode() as u32,
        };
        if segments.peek().is_none() {
            return Ok(Some(node));
        }
        if !node.is_tree() {
            return Ok(None);
        }
        current = node.oid;
    }
    Ok(None)
}

/// Like [`lookup`] but failing with `NotFound` when the path is absent, and
/// with `NotADirectory` naming the offending prefix when an intermediate
/// segment is a blob.
pub(crate) fn require(repo: &git2::Repository, root: git2::Oid, path: &str) -> Result<Node> {
    if path.is_empty() {
        return Ok(Node {
            oid: root,
            mode: MODE_TREE,
        });
    }

    let segments: Vec<&str> = path.split('/').collect();
    let mut current = root;
    for (i, seg) in segments.iter().enumerate() {
        let tree = repo.find_tree(current).map_err(Error::git)?;
        let entry = tree
            .get_name(seg)
            .ok_or_else(|| Error::not_found(segments[..=i].join("/")))?;
        let node = Node {
            oid: entry.id(),
            mode: entry.filemode() as u32,
        };
        if i == segments.len() - 1 {
            return Ok(node);
        }
        if !node.is_tree() {
            return Err(Error::not_a_directory(segments[..=i].join("/")));
        }
        current = node.oid;
    }
    Err(Error::not_found(path))
}

/// Resolve `path` to a tree id, failing with `NotADirectory` on a blob.
pub(crate) fn require_dir(repo: &git2::Repository, root: git2::Oid, path: &str) -> Result<git2::Oid> {
    let node = require(repo, root, path)?;
    if !node.is_tree() {
        return Err(Error::not_a_directory(path));
    }
    Ok(node.oid)
}

/// Read the blob at `path`, returning its full content. Symlink entries
/// yield the target bytes.
pub(crate) fn read_blob(repo: &git2::Repository, root: git2::Oid, path: &str) -> Result<Vec<u8>> {
    let node = require(repo, root, path)?;
    if node.is_tree() {
        return Err(Error::is_a_directory(path));
    }
    let blob = repo.find_blob(node.oid).map_err(Error::git)?;
    Ok(blob.content().to_vec())
}

/// Clamp `[offset, offset+size)` to the data length; offsets past the end
/// yield an empty slice and `offset + size` cannot overflow.
pub(crate) fn clamp_range(data: &[u8], offset: usize, size: Option<usize>) -> Vec<u8> {
    let start = offset.min(data.len());
    let end = match size {
        Some(s) => start.saturating_add(s).min(data.len()),
        None => data.len(),
    };
    data[start..end].to_vec()
}

/// List the immediate children of the tree at `path` (root for `""`).
pub(crate) fn list_dir(
    repo: &git2::Repository,
    root: git2::Oid,
    path: &str,
) -> Result<Vec<TreeEntry>> {
    let dir_oid = require_dir(repo, root, path)?;
    let tree = repo.find_tree(dir_oid).map_err(Error::git)?;
    Ok(tree
        .iter()
        .map(|e| TreeEntry {
            name: e.name().unwrap_or("").to_string(),
            oid: e.id(),
            mode: e.filemode() as u32,
        })
        .collect())
}

/// Recursively collect every leaf under `tree_oid` as
/// `(relative_path, entry)` pairs, in depth-first sibling order.
pub(crate) fn walk_files(
    repo: &git2::Repository,
    tree_oid: git2::Oid,
) -> Result<Vec<(String, TreeEntry)>> {
    let mut out = Vec::new();
    collect_files(repo, tree_oid, "", &mut out)?;
    Ok(out)
}

fn collect_files(
    repo: &git2::Repository,
    tree_oid: git2::Oid,
    prefix: &str,
    out: &mut Vec<(String, TreeEntry)>,
) -> Result<()> {
    let tree = repo.find_tree(tree_oid).map_err(Error::git)?;
    for entry in tree.iter() {
        let name = entry.name().unwrap_or("").to_string();
        let full = crate::path::join(prefix, &name);
        let mode = entry.filemode() as u32;
        if mode == MODE_TREE {
            collect_files(repo, entry.id(), &full, out)?;
        } else {
            out.push((
                full,
                TreeEntry {
                    name,
                    oid: entry.id(),
                    mode,
                },
            ));
        }
    }
    Ok(())
}

/// Leaves under `path` as a `rel_path -> node` map. A missing path or a
/// blob at `path` yields an empty map.
pub(crate) fn files_under(
    repo: &git2::Repository,
    root: git2::Oid,
    path: &str,
) -> Result<BTreeMap<String, Node>> {
    let mut out = BTreeMap::new();
    let dir_oid = match lookup(repo, root, path)? {
        Some(node) if node.is_tree() => node.oid,
        _ => return Ok(out),
    };
    for (rel, entry) in walk_files(repo, dir_oid)? {
        out.insert(
            rel,
            Node {
                oid: entry.oid,
                mode: entry.mode,
            },
        );
    }
    Ok(out)
}

/// os.walk-style traversal: one [`WalkDir`] per directory, parents before
/// children, siblings in canonical order.
pub(crate) fn walk_dirs(repo: &git2::Repository, tree_oid: git2::Oid) -> Result<Vec<WalkDir>> {
    let mut out = Vec::new();
    collect_dirs(repo, tree_oid, "", &mut out)?;
    Ok(out)
}

fn collect_dirs(
    repo: &git2::Repository,
    tree_oid: git2::Oid,
    prefix: &str,
    out: &mut Vec<WalkDir>,
) -> Result<()> {
    let tree = repo.find_tree(tree_oid).map_err(Error::git)?;

    let mut here = WalkDir {
        dirpath: prefix.to_string(),
        dirs: Vec::new(),
        files: Vec::new(),
    };
    let mut subtrees: Vec<(String, git2::Oid)> = Vec::new();

    for entry in tree.iter() {
        let name = entry.name().unwrap_or("").to_string();
        let mode = entry.filemode() as u32;
        if mode == MODE_TREE {
            here.dirs.push(name.clone());
            subtrees.push((name, entry.id()));
        } else {
            here.files.push(TreeEntry {
                name,
                oid: entry.id(),
                mode,
            });
        }
    }

    out.push(here);

    for (name, oid) in subtrees {
        let below = crate::path::join(prefix, &name);
        collect_dirs(repo, oid, &below, out)?;
    }
    Ok(())
}

/// Count immediate subtrees of `tree_oid`; feeds directory `nlink`.
pub(crate) fn count_subdirs(repo: &git2::Repository, tree_oid: git2::Oid) -> Result<u32> {
    let tree = repo.find_tree(tree_oid).map_err(Error::git)?;
    Ok(tree
        .iter()
        .filter(|e| e.filemode() as u32 == MODE_TREE)
        .count() as u32)
}

// ---------------------------------------------------------------------------
// Rebuilding
// ---------------------------------------------------------------------------

/// One staged operation at a canonical path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TreeOp {
    /// Place a blob (or symlink blob) at the path.
    Put { oid: git2::Oid, mode: u32 },
    /// Remove the entry at the path (blob or whole subtree).
    Drop,
}

/// A set of staged operations keyed by canonical path. One op per path:
/// plan builders that accept independent write and remove lists insert the
/// removes last, so a conflicting pair deterministically resolves to the
/// remove.
pub(crate) type TreePlan = BTreeMap<String, TreeOp>;

/// Write the empty tree object and return its id.
pub(crate) fn empty_tree(repo: &git2::Repository) -> Result<git2::Oid> {
    let builder = repo.treebuilder(None).map_err(Error::git)?;
    builder.write().map_err(Error::git)
}

/// Rebuild `base` with `plan` applied, returning the new root id.
///
/// Untouched entries keep their ids (structural sharing). Writing below a
/// path that currently holds a blob replaces the blob with a tree; a
/// subtree left empty after drops is pruned from its parent. Applying a
/// plan that changes nothing returns an id equal to `base`.
///
/// `base` may be the zero id for an empty base tree.
pub(crate) fn apply_plan(
    repo: &git2::Repository,
    base: git2::Oid,
    plan: &TreePlan,
) -> Result<git2::Oid> {
    // Partition the plan into operations on direct children and grouped
    // sub-plans per child directory.
    let mut leaf_ops: BTreeMap<&str, TreeOp> = BTreeMap::new();
    let mut child_plans: BTreeMap<&str, TreePlan> = BTreeMap::new();

    for (path, op) in plan {
        match path.split_once('/') {
            None => {
                leaf_ops.insert(path.as_str(), *op);
            }
            Some((dir, rest)) => {
                child_plans
                    .entry(dir)
                    .or_default()
                    .insert(rest.to_string(), *op);
            }
        }
    }

    // Current entries of this level.
    let mut entries: BTreeMap<String, Node> = BTreeMap::new();
    if !base.is_zero() {
        let tree = repo.find_tree(base).map_err(Error::git)?;
        for entry in tree.iter() {
            entries.insert(
                entry.name().unwrap_or("").to_string(),
                Node {
                    oid: entry.id(),
                    mode: entry.filemode() as u32,
                },
            );
        }
    }

    for (name, op) in leaf_ops {
        match op {
            TreeOp::Put { oid, mode } => {
                entries.insert(name.to_string(), Node { oid, mode });
            }
            TreeOp::Drop => {
                entries.remove(name);
            }
        }
    }

    for (dir, sub_plan) in child_plans {
        // A blob in the way of a deeper write is replaced by a tree.
        let sub_base = match entries.get(dir) {
            Some(node) if node.is_tree() => node.oid,
            Some(_) => {
                entries.remove(dir);
                git2::Oid::zero()
            }
            None => git2::Oid::zero(),
        };

        let rebuilt = apply_plan(repo, sub_base, &sub_plan)?;
        let rebuilt_tree = repo.find_tree(rebuilt).map_err(Error::git)?;
        if rebuilt_tree.len() == 0 {
            entries.remove(dir);
        } else {
            entries.insert(
                dir.to_string(),
                Node {
                    oid: rebuilt,
                    mode: MODE_TREE,
                },
            );
        }
    }

    let mut builder = repo.treebuilder(None).map_err(Error::git)?;
    for (name, node) in &entries {
        builder
            .insert(name, node.oid, node.mode as i32)
            .map_err(Error::git)?;
    }
    builder.write().map_err(Error::git)
}

/// Determine the git filemode for a file on disk: symlink, executable
/// (Unix), or regular blob.
pub(crate) fn mode_from_disk(path: &Path) -> Result<u32> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| Error::io(path, e))?;
    if meta.file_type().is_symlink() {
        return Ok(MODE_LINK);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 != 0 {
            return Ok(MODE_BLOB_EXEC);
        }
    }
    Ok(MODE_BLOB)
}
