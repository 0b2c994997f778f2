//! Shell-style pattern matching for names and tree paths.
//!
//! `*` and `?` never cross a `/`; the tree glob in
//! [`expand`](crate::glob::expand) handles `**` as "zero or more segments".
//! Wildcards skip names starting with `.` unless the pattern segment itself
//! starts with `.`.

use crate::error::{Error, Result};
use crate::types::MODE_TREE;

/// Match `name` against `pattern`, with dotfile protection.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    if name.starts_with('.') && !pattern.starts_with('.') {
        return false;
    }
    fnmatch(pattern.as_bytes(), name.as_bytes())
}

/// Backtracking fnmatch over bytes: `*` matches any run, `?` one byte.
/// No dotfile protection; used directly by the exclude filter.
pub(crate) fn fnmatch(pat: &[u8], name: &[u8]) -> bool {
    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ni < name.len() {
        if pi < pat.len() && (pat[pi] == b'?' || pat[pi] == name[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < pat.len() && pat[pi] == b'*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((spi, sni)) = star {
            pi = spi + 1;
            star = Some((spi, sni + 1));
            ni = sni + 1;
        } else {
            return false;
        }
    }

    while pi < pat.len() && pat[pi] == b'*' {
        pi += 1;
    }
    pi == pat.len()
}

/// Expand a glob pattern against the tree rooted at `tree_oid`.
///
/// Matches leaf entries only (never directories). Results are in traversal
/// order; callers wanting sorted output sort afterwards.
pub(crate) fn expand(
    repo: &git2::Repository,
    tree_oid: git2::Oid,
    pattern: &str,
) -> Result<Vec<String>> {
    let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let mut results = Vec::new();
    if segments.is_empty() {
        return Ok(results);
    }
    descend(repo, tree_oid, &segments, "", &mut results)?;
    Ok(results)
}

fn descend(
    repo: &git2::Repository,
    tree_oid: git2::Oid,
    segments: &[&str],
    prefix: &str,
    results: &mut Vec<String>,
) -> Result<()> {
    let Some((seg, rest)) = segments.split_first() else {
        return Ok(());
    };

    let tree = repo.find_tree(tree_oid).map_err(Error::git)?;

    if *seg == "**" {
        // A trailing `**` means everything under this directory.
        if rest.is_empty() {
            return collect_leaves(repo, tree_oid, prefix, results);
        }
        // Zero segments consumed here...
        descend(repo, tree_oid, rest, prefix, results)?;
        // ...or recurse into every non-hidden subtree keeping `**` active.
        for entry in tree.iter() {
            let name = entry.name().unwrap_or("").to_string();
            if name.starts_with('.') {
                continue;
            }
            if entry.filemode() as u32 == MODE_TREE {
                let below = crate::path::join(prefix, &name);
                descend(repo, entry.id(), segments, &below, results)?;
            }
        }
        return Ok(());
    }

    for entry in tree.iter() {
        let name = entry.name().unwrap_or("").to_string();
        if !glob_match(seg, &name) {
            continue;
        }
        let full = crate::path::join(prefix, &name);
        let is_tree = entry.filemode() as u32 == MODE_TREE;

        if rest.is_empty() {
            if !is_tree {
                results.push(full);
            }
        } else if is_tree {
            descend(repo, entry.id(), rest, &full, results)?;
        }
    }

    Ok(())
}

/// All non-hidden leaf files below `tree_oid`, at any depth. Dot-prefixed
/// names are skipped at every level, matching the wildcard guard.
fn collect_leaves(
    repo: &git2::Repository,
    tree_oid: git2::Oid,
    prefix: &str,
    results: &mut Vec<String>,
) -> Result<()> {
    let tree = repo.find_tree(tree_oid).map_err(Error::git)?;
    for entry in tree.iter() {
        let name = entry.name().unwrap_or("").to_string();
        if name.starts_with('.') {
            continue;
        }
        let full = crate::path::join(prefix, &name);
        if entry.filemode() as u32 == MODE_TREE {
            collect_leaves(repo, entry.id(), &full, results)?;
        } else {
            results.push(full);
        }
    }
    Ok(())
}
