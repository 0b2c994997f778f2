//! The change detector: minimal file-level differences between two trees.
//!
//! Subtrees with equal ids short-circuit, so the cost is proportional to
//! the changed region rather than the tree size. Tree-level differences are
//! decomposed into leaf adds/deletes; empty intermediate directories never
//! appear in a report.

use crate::error::Result;
use crate::tree::{self, Node};
use crate::types::{ChangeReport, FileEntry, FileType};

/// Diff the trees `old` and `new` under `scope` (canonical path; empty for
/// the whole tree) into a [`ChangeReport`].
///
/// A leaf present only in `new` is an add, only in `old` a delete, in both
/// with a different id or mode an update.
pub(crate) fn diff_trees(
    repo: &git2::Repository,
    old: Option<git2::Oid>,
    new: Option<git2::Oid>,
    scope: &str,
) -> Result<ChangeReport> {
    let old_node = match old {
        Some(root) => tree::lookup(repo, root, scope)?,
        None => None,
    };
    let new_node = match new {
        Some(root) => tree::lookup(repo, root, scope)?,
        None => None,
    };

    let mut report = ChangeReport::new();
    diff_nodes(repo, scope, old_node, new_node, &mut report)?;
    Ok(report)
}

fn leaf_type(mode: u32) -> FileType {
    FileType::from_mode(mode).unwrap_or(FileType::Blob)
}

fn diff_nodes(
    repo: &git2::Repository,
    path: &str,
    old: Option<Node>,
    new: Option<Node>,
    report: &mut ChangeReport,
) -> Result<()> {
    match (old, new) {
        (None, None) => Ok(()),
        (a, b) if a == b => Ok(()),

        (None, Some(n)) => record_side(repo, path, n, report, Side::Add),
        (Some(o), None) => record_side(repo, path, o, report, Side::Delete),

        (Some(o), Some(n)) => match (o.is_tree(), n.is_tree()) {
            (true, true) => diff_children(repo, path, o.oid, n.oid, report),
            (true, false) => {
                record_side(repo, path, o, report, Side::Delete)?;
                record_side(repo, path, n, report, Side::Add)
            }
            (false, true) => {
                record_side(repo, path, o, report, Side::Delete)?;
                record_side(repo, path, n, report, Side::Add)
            }
            (false, false) => {
                // Same path, blob on both sides, different id or mode.
                report.update.push(FileEntry::new(path, leaf_type(n.mode)));
                Ok(())
            }
        },
    }
}

fn diff_children(
    repo: &git2::Repository,
    prefix: &str,
    old_tree: git2::Oid,
    new_tree: git2::Oid,
    report: &mut ChangeReport,
) -> Result<()> {
    use std::collections::BTreeMap;

    let mut names: BTreeMap<String, (Option<Node>, Option<Node>)> = BTreeMap::new();

    for entry in tree_entries(repo, old_tree)? {
        names.entry(entry.0).or_default().0 = Some(entry.1);
    }
    for entry in tree_entries(repo, new_tree)? {
        names.entry(entry.0).or_default().1 = Some(entry.1);
    }

    for (name, (old, new)) in names {
        let child = crate::path::join(prefix, &name);
        diff_nodes(repo, &child, old, new, report)?;
    }
    Ok(())
}

fn tree_entries(repo: &git2::Repository, tree_oid: git2::Oid) -> Result<Vec<(String, Node)>> {
    let tree = repo.find_tree(tree_oid).map_err(crate::error::Error::git)?;
    Ok(tree
        .iter()
        .map(|e| {
            (
                e.name().unwrap_or("").to_string(),
                Node {
                    oid: e.id(),
                    mode: e.filemode() as u32,
                },
            )
        })
        .collect())
}

/// Classify a staged [`Plan`](crate::update::Plan) against `base_tree`
/// without writing any objects: the same report [`diff_trees`] would
/// produce for the rebuilt tree, used for dry runs and for the report
/// attached to the resulting snapshot.
pub(crate) fn report_for_plan(
    repo: &git2::Repository,
    base_tree: git2::Oid,
    plan: &crate::update::Plan,
) -> Result<ChangeReport> {
    use std::collections::BTreeSet;

    let mut report = ChangeReport::new();
    let mut deleted: BTreeSet<String> = BTreeSet::new();

    for (path, pw) in &plan.writes {
        if plan.removes.contains(path) {
            // The engine resolves a write/remove conflict to the remove.
            continue;
        }
        match tree::lookup(repo, base_tree, path)? {
            Some(node) if !node.is_tree() => {
                if node.oid == pw.oid && node.mode == pw.mode {
                    continue; // unchanged
                }
                report.update.push(FileEntry::new(path, leaf_type(pw.mode)));
            }
            Some(node) => {
                // A tree gives way to a blob: its leaves disappear.
                for (rel, entry) in tree::walk_files(repo, node.oid)? {
                    let full = crate::path::join(path, &rel);
                    if deleted.insert(full.clone()) {
                        report.delete.push(FileEntry::new(full, leaf_type(entry.mode)));
                    }
                }
                report.add.push(FileEntry::new(path, leaf_type(pw.mode)));
            }
            None => {
                // A blob on the ancestor chain is promoted to a tree and
                // its content drops out.
                if let Some((blob_path, node)) = blocking_ancestor(repo, base_tree, path)? {
                    if deleted.insert(blob_path.clone()) {
                        report
                            .delete
                            .push(FileEntry::new(blob_path, leaf_type(node.mode)));
                    }
                }
                report.add.push(FileEntry::new(path, leaf_type(pw.mode)));
            }
        }
    }

    for path in &plan.removes {
        match tree::lookup(repo, base_tree, path)? {
            Some(node) if node.is_tree() => {
                for (rel, entry) in tree::walk_files(repo, node.oid)? {
                    let full = crate::path::join(path, &rel);
                    if deleted.insert(full.clone()) {
                        report.delete.push(FileEntry::new(full, leaf_type(entry.mode)));
                    }
                }
            }
            Some(node) => {
                if deleted.insert(path.clone()) {
                    report.delete.push(FileEntry::new(path, leaf_type(node.mode)));
                }
            }
            None => {}
        }
    }

    Ok(report)
}

/// The nearest ancestor of `path` that exists as a blob in `base_tree`.
fn blocking_ancestor(
    repo: &git2::Repository,
    base_tree: git2::Oid,
    path: &str,
) -> Result<Option<(String, Node)>> {
    let mut prefix = String::new();
    for seg in path.split('/') {
        prefix = crate::path::join(&prefix, seg);
        if prefix == path {
            break;
        }
        match tree::lookup(repo, base_tree, &prefix)? {
            Some(node) if !node.is_tree() => return Ok(Some((prefix, node))),
            Some(_) => continue,
            None => return Ok(None),
        }
    }
    Ok(None)
}

enum Side {
    Add,
    Delete,
}

/// Record a whole node on one side of the diff: a leaf directly, a tree as
/// all of its leaves.
fn record_side(
    repo: &git2::Repository,
    path: &str,
    node: Node,
    report: &mut ChangeReport,
    side: Side,
) -> Result<()> {
    if node.is_tree() {
        for (rel, entry) in tree::walk_files(repo, node.oid)? {
            let full = crate::path::join(path, &rel);
            let fe = FileEntry::new(full, leaf_type(entry.mode));
            match side {
                Side::Add => report.add.push(fe),
                Side::Delete => report.delete.push(fe),
            }
        }
    } else {
        let fe = FileEntry::new(path, leaf_type(node.mode));
        match side {
            Side::Add => report.add.push(fe),
            Side::Delete => report.delete.push(fe),
        }
    }
    Ok(())
}
