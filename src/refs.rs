//! Dictionary-style access to branches and tags.
//!
//! A [`RefDict`] views one ref namespace (`refs/heads/` or `refs/tags/`).
//! Lookups resolve to snapshots: writable for branches, read-only for
//! tags. Creation and deletion follow dictionary semantics (`KeyExists` /
//! `KeyNotFound`).

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::lock::with_repo_lock;
use crate::snapshot::Snapshot;
use crate::store::StoreShared;
use crate::types::ReflogEntry;

/// A view over the refs sharing one prefix.
pub struct RefDict {
    shared: Arc<StoreShared>,
    prefix: &'static str,
    writable: bool,
}

impl RefDict {
    pub(crate) fn branches(shared: Arc<StoreShared>) -> Self {
        Self {
            shared,
            prefix: "refs/heads/",
            writable: true,
        }
    }

    pub(crate) fn tags(shared: Arc<StoreShared>) -> Self {
        Self {
            shared,
            prefix: "refs/tags/",
            writable: false,
        }
    }

    fn full_name(&self, name: &str) -> Result<String> {
        crate::path::validate_ref_name(name)?;
        Ok(format!("{}{}", self.prefix, name))
    }

    /// The snapshot at the tip of `name`.
    ///
    /// # Errors
    /// [`Error::KeyNotFound`] when the ref does not exist.
    pub fn get(&self, name: &str) -> Result<Snapshot> {
        self.try_get(name)?
            .ok_or_else(|| Error::key_not_found(name))
    }

    /// The snapshot at the tip of `name`, or `None` when absent.
    pub fn try_get(&self, name: &str) -> Result<Option<Snapshot>> {
        let refname = self.full_name(name)?;
        let target = self.shared.with_repo(|repo| {
            match repo.find_reference(&refname) {
                // Peels annotated tag objects down to their commits.
                Ok(reference) => Ok(reference.peel_to_commit().ok().map(|c| c.id())),
                Err(_) => Ok(None),
            }
        })?;
        target
            .map(|oid| {
                Snapshot::from_commit(
                    Arc::clone(&self.shared),
                    oid,
                    Some(name.to_string()),
                    self.writable,
                )
            })
            .transpose()
    }

    /// Create `name` pointing at `from`'s commit.
    ///
    /// # Errors
    /// [`Error::KeyExists`] when the ref already exists.
    pub fn create(&self, name: &str, from: &Snapshot) -> Result<Snapshot> {
        let refname = self.full_name(name)?;
        let target = from.commit_oid;

        let repo = self.shared.lock_repo()?;
        with_repo_lock(&self.shared.path, || {
            if repo.find_reference(&refname).is_ok() {
                return Err(Error::key_exists(name));
            }
            let log_msg = format!("branch: Created from {}", target);
            repo.reference(&refname, target, false, &log_msg)
                .map_err(Error::git)?;
            if self.writable {
                crate::reflog::append(
                    &self.shared.path,
                    &refname,
                    &ReflogEntry {
                        old_oid: crate::reflog::ZERO_OID.to_string(),
                        new_oid: target.to_string(),
                        committer: self.shared.signature.identity(),
                        timestamp: self.shared.clock.now(),
                        message: log_msg,
                    },
                )?;
            }
            Ok(())
        })?;
        drop(repo);

        Snapshot::from_commit(
            Arc::clone(&self.shared),
            target,
            Some(name.to_string()),
            self.writable,
        )
    }

    /// Point `name` at the commit `hash`, creating the ref if needed.
    ///
    /// # Errors
    /// [`Error::InvalidHash`] on a malformed id, [`Error::NotFound`] when
    /// the commit is not in the object store.
    pub fn set_target(&self, name: &str, hash: &str) -> Result<()> {
        let refname = self.full_name(name)?;
        crate::path::validate_hex_oid(hash)?;
        let target = git2::Oid::from_str(hash).map_err(|_| Error::invalid_hash(hash))?;

        let repo = self.shared.lock_repo()?;
        with_repo_lock(&self.shared.path, || {
            repo.find_commit(target)
                .map_err(|_| Error::not_found(format!("no such commit: {}", hash)))?;

            let old = repo
                .find_reference(&refname)
                .ok()
                .and_then(|r| r.target())
                .map(|o| o.to_string())
                .unwrap_or_else(|| crate::reflog::ZERO_OID.to_string());

            let log_msg = format!("reset: moving to {}", hash);
            repo.reference(&refname, target, true, &log_msg)
                .map_err(Error::git)?;
            if self.writable {
                crate::reflog::append(
                    &self.shared.path,
                    &refname,
                    &ReflogEntry {
                        old_oid: old,
                        new_oid: hash.to_string(),
                        committer: self.shared.signature.identity(),
                        timestamp: self.shared.clock.now(),
                        message: log_msg,
                    },
                )?;
            }
            Ok(())
        })
    }

    /// Delete `name` and its reflog.
    ///
    /// # Errors
    /// [`Error::KeyNotFound`] when the ref does not exist.
    pub fn delete(&self, name: &str) -> Result<()> {
        let refname = self.full_name(name)?;
        let repo = self.shared.lock_repo()?;
        with_repo_lock(&self.shared.path, || {
            let mut reference = repo
                .find_reference(&refname)
                .map_err(|_| Error::key_not_found(name))?;
            reference.delete().map_err(Error::git)?;
            crate::reflog::remove(&self.shared.path, &refname)?;
            Ok(())
        })
    }

    /// Whether `name` exists.
    pub fn has(&self, name: &str) -> Result<bool> {
        let refname = self.full_name(name)?;
        self.shared
            .with_repo(|repo| Ok(repo.find_reference(&refname).is_ok()))
    }

    /// All names under this prefix, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.iter()?.into_iter().map(|(name, _)| name).collect())
    }

    /// All `(name, 40-hex target)` pairs under this prefix, sorted by name.
    pub fn iter(&self) -> Result<Vec<(String, String)>> {
        let glob = format!("{}*", self.prefix);
        self.shared.with_repo(|repo| {
            let mut pairs = Vec::new();
            for reference in repo.references_glob(&glob).map_err(Error::git)?.flatten() {
                let Some(full) = reference.name() else {
                    continue;
                };
                let Some(short) = full.strip_prefix(self.prefix) else {
                    continue;
                };
                if let Some(oid) = reference.target() {
                    pairs.push((short.to_string(), oid.to_string()));
                }
            }
            pairs.sort();
            Ok(pairs)
        })
    }

    /// The name HEAD points at within this prefix, if any.
    pub fn default(&self) -> Result<Option<String>> {
        self.shared.with_repo(|repo| {
            let head = match repo.find_reference("HEAD") {
                Ok(r) => r,
                Err(_) => return Ok(None),
            };
            Ok(head
                .symbolic_target()
                .and_then(|t| t.strip_prefix(self.prefix))
                .map(|s| s.to_string()))
        })
    }

    /// Attach HEAD to `name`.
    ///
    /// # Errors
    /// [`Error::KeyNotFound`] when the ref does not exist.
    pub fn set_default(&self, name: &str) -> Result<()> {
        let refname = self.full_name(name)?;
        self.shared.with_repo(|repo| {
            repo.find_reference(&refname)
                .map_err(|_| Error::key_not_found(name))?;
            repo.set_head(&refname).map_err(Error::git)?;
            Ok(())
        })
    }

    /// The reflog of `name`, most recent entry first.
    ///
    /// # Errors
    /// [`Error::NotFound`] when the ref has no reflog file.
    pub fn reflog(&self, name: &str) -> Result<Vec<ReflogEntry>> {
        let refname = self.full_name(name)?;
        crate::reflog::read(&self.shared.path, &refname)
    }
}
