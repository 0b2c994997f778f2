//! Commit-addressed note namespaces.
//!
//! Each namespace is a linear history on `refs/notes/<ns>` whose tree maps
//! 40-hex commit ids to UTF-8 note blobs. Two layouts occur in the wild
//! and may be interleaved in one tree: flat (`<40-hex>` at the root) and
//! 2/38 fanout (`<2-hex>/<38-hex>`). Reads handle both; writes update an
//! existing entry in the layout it already uses and create new entries
//! flat.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::lock::with_repo_lock;
use crate::snapshot::Snapshot;
use crate::store::StoreShared;
use crate::types::{MODE_BLOB, MODE_TREE};

/// What a note operation targets: a 40-hex commit id, a revision name
/// (branch, tag, abbreviated hash), or a snapshot.
#[derive(Debug, Clone, Copy)]
pub enum NoteTarget<'a> {
    Rev(&'a str),
    Snapshot(&'a Snapshot),
}

impl<'a> From<&'a str> for NoteTarget<'a> {
    fn from(rev: &'a str) -> Self {
        Self::Rev(rev)
    }
}

impl<'a> From<&'a Snapshot> for NoteTarget<'a> {
    fn from(snapshot: &'a Snapshot) -> Self {
        Self::Snapshot(snapshot)
    }
}

/// Accessor for note namespaces on a store.
pub struct Notes {
    shared: Arc<StoreShared>,
}

impl Notes {
    pub(crate) fn new(shared: Arc<StoreShared>) -> Self {
        Self { shared }
    }

    /// The conventional default namespace, `refs/notes/commits`.
    pub fn commits(&self) -> NoteNamespace {
        NoteNamespace {
            shared: Arc::clone(&self.shared),
            name: "commits".to_string(),
            ref_name: "refs/notes/commits".to_string(),
        }
    }

    /// A namespace by name (`refs/notes/<name>`), created lazily on first
    /// write.
    pub fn namespace(&self, name: &str) -> Result<NoteNamespace> {
        crate::path::validate_ref_name(name)?;
        Ok(NoteNamespace {
            shared: Arc::clone(&self.shared),
            name: name.to_string(),
            ref_name: format!("refs/notes/{}", name),
        })
    }
}

/// One note namespace: a map from commit ids to note text.
#[derive(Clone)]
pub struct NoteNamespace {
    shared: Arc<StoreShared>,
    name: String,
    ref_name: String,
}

impl NoteNamespace {
    /// The namespace name (without the `refs/notes/` prefix).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve a target to its 40-hex commit id.
    fn resolve<'a>(&self, target: impl Into<NoteTarget<'a>>) -> Result<String> {
        match target.into() {
            NoteTarget::Snapshot(snapshot) => Ok(snapshot.commit_hash()),
            NoteTarget::Rev(rev) => {
                if crate::path::is_hex_oid(rev) {
                    return Ok(rev.to_string());
                }
                self.shared.with_repo(|repo| {
                    let obj = repo.revparse_single(rev).map_err(|_| {
                        Error::not_found(format!("cannot resolve revision {:?}", rev))
                    })?;
                    let commit = obj
                        .peel_to_commit()
                        .map_err(|_| Error::not_found(format!("{:?} is not a commit", rev)))?;
                    Ok(commit.id().to_string())
                })
            }
        }
    }

    fn tip(&self, repo: &git2::Repository) -> Option<git2::Oid> {
        repo.find_reference(&self.ref_name)
            .ok()
            .and_then(|r| r.target())
    }

    fn tip_tree(&self, repo: &git2::Repository) -> Result<Option<git2::Oid>> {
        match self.tip(repo) {
            None => Ok(None),
            Some(tip) => {
                let commit = repo.find_commit(tip).map_err(Error::git)?;
                Ok(Some(commit.tree_id()))
            }
        }
    }

    // -- Reads --------------------------------------------------------------

    /// The note text for `target`.
    ///
    /// # Errors
    /// [`Error::NotFound`] when the target has no note.
    pub fn get<'a>(&self, target: impl Into<NoteTarget<'a>>) -> Result<String> {
        let hash = self.resolve(target)?;
        self.shared.with_repo(|repo| {
            let tree = self
                .tip_tree(repo)?
                .ok_or_else(|| Error::not_found(format!("no note for {}", hash)))?;
            let blob_oid = find_note(repo, tree, &hash)?
                .ok_or_else(|| Error::not_found(format!("no note for {}", hash)))?;
            let blob = repo.find_blob(blob_oid).map_err(Error::git)?;
            String::from_utf8(blob.content().to_vec())
                .map_err(|e| Error::invalid_argument(format!("note is not UTF-8: {}", e)))
        })
    }

    /// Whether `target` has a note.
    pub fn has<'a>(&self, target: impl Into<NoteTarget<'a>>) -> Result<bool> {
        let hash = self.resolve(target)?;
        self.shared.with_repo(|repo| match self.tip_tree(repo)? {
            None => Ok(false),
            Some(tree) => Ok(find_note(repo, tree, &hash)?.is_some()),
        })
    }

    /// All commit ids carrying notes, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        self.shared.with_repo(|repo| {
            let Some(tree) = self.tip_tree(repo)? else {
                return Ok(Vec::new());
            };
            let mut hashes: Vec<String> =
                iter_notes(repo, tree)?.into_iter().map(|(h, _)| h).collect();
            hashes.sort();
            Ok(hashes)
        })
    }

    /// Number of notes in this namespace.
    pub fn len(&self) -> Result<usize> {
        self.shared.with_repo(|repo| match self.tip_tree(repo)? {
            None => Ok(0),
            Some(tree) => Ok(iter_notes(repo, tree)?.len()),
        })
    }

    /// Whether the namespace holds no notes.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // -- Writes -------------------------------------------------------------

    /// Attach (or replace) the note for `target`. One commit per call.
    pub fn set<'a>(&self, target: impl Into<NoteTarget<'a>>, text: &str) -> Result<()> {
        let hash = self.resolve(target)?;
        let message = format!("Notes added for {}", &hash[..7]);
        self.mutate(&[(hash, text.to_string())], &[], &message)
    }

    /// Remove the note for `target`.
    ///
    /// # Errors
    /// [`Error::NotFound`] when the target has no note.
    pub fn delete<'a>(&self, target: impl Into<NoteTarget<'a>>) -> Result<()> {
        let hash = self.resolve(target)?;
        let message = format!("Notes removed for {}", &hash[..7]);
        self.mutate(&[], std::slice::from_ref(&hash), &message)
    }

    /// The note on the default branch's current tip.
    pub fn get_for_default_branch(&self) -> Result<String> {
        let hash = self.head_commit()?;
        self.get(hash.as_str())
    }

    /// Attach a note to the default branch's current tip.
    pub fn set_for_default_branch(&self, text: &str) -> Result<()> {
        let hash = self.head_commit()?;
        self.set(hash.as_str(), text)
    }

    fn head_commit(&self) -> Result<String> {
        self.shared.with_repo(|repo| {
            let head = repo
                .find_reference("HEAD")
                .map_err(|_| Error::invalid_state("repository has no HEAD"))?;
            let resolved = head
                .resolve()
                .map_err(|_| Error::invalid_state("HEAD does not point at a branch"))?;
            let oid = resolved
                .target()
                .ok_or_else(|| Error::invalid_state("HEAD is unborn"))?;
            Ok(oid.to_string())
        })
    }

    /// A batch accumulating note mutations into a single commit.
    pub fn batch(&self) -> NotesBatch {
        NotesBatch {
            namespace: self.clone(),
            writes: Vec::new(),
            deletes: Vec::new(),
        }
    }

    /// Apply writes and deletes as one commit on the notes ref, parented
    /// on the tip re-read under the advisory lock.
    fn mutate(&self, writes: &[(String, String)], deletes: &[String], message: &str) -> Result<()> {
        let repo = self.shared.lock_repo()?;
        with_repo_lock(&self.shared.path, || {
            let tip = self.tip(&repo);
            let base_tree = match tip {
                Some(t) => Some(repo.find_commit(t).map_err(Error::git)?.tree_id()),
                None => None,
            };

            let new_tree = build_note_tree(&repo, base_tree, writes, deletes)?;
            if Some(new_tree) == base_tree {
                return Ok(());
            }

            let sig = self.shared.git_signature()?;
            let tree = repo.find_tree(new_tree).map_err(Error::git)?;
            let parent = match tip {
                Some(t) => Some(repo.find_commit(t).map_err(Error::git)?),
                None => None,
            };
            let parents: Vec<&git2::Commit> = parent.iter().collect();
            let commit = repo
                .commit(None, &sig, &sig, message, &tree, &parents)
                .map_err(Error::git)?;
            repo.reference(&self.ref_name, commit, true, message)
                .map_err(Error::git)?;
            log::debug!("notes {}: {}", self.name, message);
            Ok(())
        })
    }
}

impl std::fmt::Display for NoteNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NoteNamespace({:?})", self.name)
    }
}

/// Accumulates note mutations and applies them in one commit.
///
/// The last action per target wins; a delete after a set deletes. An empty
/// batch creates no commit.
pub struct NotesBatch {
    namespace: NoteNamespace,
    writes: Vec<(String, String)>,
    deletes: Vec<String>,
}

impl NotesBatch {
    /// Stage setting the note for `target`.
    pub fn set<'a>(&mut self, target: impl Into<NoteTarget<'a>>, text: &str) -> Result<()> {
        let hash = self.namespace.resolve(target)?;
        self.deletes.retain(|h| h != &hash);
        self.writes.retain(|(h, _)| h != &hash);
        self.writes.push((hash, text.to_string()));
        Ok(())
    }

    /// Stage deleting the note for `target`.
    pub fn delete<'a>(&mut self, target: impl Into<NoteTarget<'a>>) -> Result<()> {
        let hash = self.namespace.resolve(target)?;
        self.writes.retain(|(h, _)| h != &hash);
        if !self.deletes.contains(&hash) {
            self.deletes.push(hash);
        }
        Ok(())
    }

    /// Apply everything staged in one commit, consuming the batch.
    pub fn commit(self) -> Result<()> {
        if self.writes.is_empty() && self.deletes.is_empty() {
            return Ok(());
        }
        let count = self.writes.len() + self.deletes.len();
        let message = format!("Notes batch update ({} changes)", count);
        self.namespace.mutate(&self.writes, &self.deletes, &message)
    }
}

// ---------------------------------------------------------------------------
// Tree plumbing
// ---------------------------------------------------------------------------

fn tree_entries(
    repo: &git2::Repository,
    tree_oid: git2::Oid,
) -> Result<Vec<(String, git2::Oid, u32)>> {
    let tree = repo.find_tree(tree_oid).map_err(Error::git)?;
    Ok(tree
        .iter()
        .map(|e| {
            (
                e.name().unwrap_or("").to_string(),
                e.id(),
                e.filemode() as u32,
            )
        })
        .collect())
}

fn write_entries(
    repo: &git2::Repository,
    entries: &BTreeMap<String, (git2::Oid, u32)>,
) -> Result<git2::Oid> {
    let mut builder = repo.treebuilder(None).map_err(Error::git)?;
    for (name, (oid, mode)) in entries {
        builder
            .insert(name, *oid, *mode as i32)
            .map_err(Error::git)?;
    }
    builder.write().map_err(Error::git)
}

/// Find the blob for `hash`, checking the flat layout first, then the 2/38
/// fanout.
fn find_note(
    repo: &git2::Repository,
    tree_oid: git2::Oid,
    hash: &str,
) -> Result<Option<git2::Oid>> {
    let tree = repo.find_tree(tree_oid).map_err(Error::git)?;

    if let Some(entry) = tree.get_name(hash) {
        if entry.filemode() as u32 != MODE_TREE {
            return Ok(Some(entry.id()));
        }
    }

    let (prefix, suffix) = hash.split_at(2);
    if let Some(entry) = tree.get_name(prefix) {
        if entry.filemode() as u32 == MODE_TREE {
            let sub = repo.find_tree(entry.id()).map_err(Error::git)?;
            let leaf_id = sub.get_name(suffix).map(|leaf| leaf.id());
            if let Some(leaf_id) = leaf_id {
                return Ok(Some(leaf_id));
            }
        }
    }

    Ok(None)
}

/// All `(hash, blob)` pairs of a notes tree, both layouts.
fn iter_notes(
    repo: &git2::Repository,
    tree_oid: git2::Oid,
) -> Result<Vec<(String, git2::Oid)>> {
    let mut out = Vec::new();
    for (name, oid, mode) in tree_entries(repo, tree_oid)? {
        if mode == MODE_TREE && name.len() == 2 {
            for (sub_name, sub_oid, sub_mode) in tree_entries(repo, oid)? {
                if sub_mode == MODE_TREE {
                    continue;
                }
                let full = format!("{}{}", name, sub_name);
                if crate::path::is_hex_oid(&full) {
                    out.push((full, sub_oid));
                }
            }
        } else if crate::path::is_hex_oid(&name) {
            out.push((name, oid));
        }
    }
    Ok(out)
}

/// Rebuild a notes tree with `writes` and `deletes` applied. Existing
/// entries keep their layout; new entries are written flat.
fn build_note_tree(
    repo: &git2::Repository,
    base_tree: Option<git2::Oid>,
    writes: &[(String, String)],
    deletes: &[String],
) -> Result<git2::Oid> {
    let mut root: BTreeMap<String, (git2::Oid, u32)> = BTreeMap::new();
    if let Some(base) = base_tree {
        for (name, oid, mode) in tree_entries(repo, base)? {
            root.insert(name, (oid, mode));
        }
    }

    for hash in deletes {
        if let Some((_, mode)) = root.get(hash) {
            if *mode != MODE_TREE {
                root.remove(hash);
                continue;
            }
        }
        if !fanout_update(repo, &mut root, hash, None)? {
            return Err(Error::not_found(format!("no note for {}", hash)));
        }
    }

    for (hash, text) in writes {
        let blob = repo.blob(text.as_bytes()).map_err(Error::git)?;
        let flat_exists = matches!(root.get(hash), Some((_, mode)) if *mode != MODE_TREE);
        if !flat_exists && fanout_update(repo, &mut root, hash, Some(blob))? {
            continue; // updated in place inside the fanout subtree
        }
        root.insert(hash.clone(), (blob, MODE_BLOB));
    }

    write_entries(repo, &root)
}

/// Update or remove the fanout entry for `hash`, rewriting the `<2-hex>`
/// subtree. Returns whether the hash was present in fanout form.
fn fanout_update(
    repo: &git2::Repository,
    root: &mut BTreeMap<String, (git2::Oid, u32)>,
    hash: &str,
    replacement: Option<git2::Oid>,
) -> Result<bool> {
    let (prefix, suffix) = hash.split_at(2);
    let Some(&(sub_oid, mode)) = root.get(prefix) else {
        return Ok(false);
    };
    if mode != MODE_TREE {
        return Ok(false);
    }

    let mut sub: BTreeMap<String, (git2::Oid, u32)> = BTreeMap::new();
    for (name, oid, mode) in tree_entries(repo, sub_oid)? {
        sub.insert(name, (oid, mode));
    }
    if !sub.contains_key(suffix) {
        return Ok(false);
    }

    match replacement {
        Some(blob) => {
            sub.insert(suffix.to_string(), (blob, MODE_BLOB));
            let new_sub = write_entries(repo, &sub)?;
            root.insert(prefix.to_string(), (new_sub, MODE_TREE));
        }
        None => {
            sub.remove(suffix);
            if sub.is_empty() {
                root.remove(prefix);
            } else {
                let new_sub = write_entries(repo, &sub)?;
                root.insert(prefix.to_string(), (new_sub, MODE_TREE));
            }
        }
    }
    Ok(true)
}
