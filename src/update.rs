//! The ref updater: compare-and-set branch advancement under the advisory
//! lock.
//!
//! Every mutating operation stages its content into a [`Plan`] and hands it
//! to [`advance`], which implements the transaction protocol: take the
//! in-process repository mutex and the cross-process file lock, re-read the
//! branch tip, reject stale snapshots, rebuild the tree, short-circuit
//! no-ops, then write the commit, move the ref, and append the reflog
//! entry. Failures before the ref write leave no branch state behind; an
//! unreferenced commit object is harmless and reclaimable.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::lock::with_repo_lock;
use crate::store::StoreShared;
use crate::tree::{self, TreeOp, TreePlan};
use crate::types::{ChangeReport, ReflogEntry};

/// One staged write: a blob id (pre-computed, not necessarily stored yet),
/// its mode, and the bytes to store. `bytes` is `None` when the blob
/// already lives in the object database (a zero-copy reference).
#[derive(Debug, Clone)]
pub(crate) struct PendingWrite {
    pub oid: git2::Oid,
    pub mode: u32,
    pub bytes: Option<Vec<u8>>,
}

impl PendingWrite {
    /// Stage raw bytes; the id is computed without touching the store, so
    /// planning (and dry runs) write no objects.
    pub fn from_bytes(bytes: Vec<u8>, mode: u32) -> Result<Self> {
        let oid = git2::Oid::hash_object(git2::ObjectType::Blob, &bytes).map_err(Error::git)?;
        Ok(Self {
            oid,
            mode,
            bytes: Some(bytes),
        })
    }

    /// Reference a blob that is already in the object database.
    pub fn from_existing(oid: git2::Oid, mode: u32) -> Self {
        Self {
            oid,
            mode,
            bytes: None,
        }
    }
}

/// The staged content of one transaction: leaf writes keyed by canonical
/// path plus a set of paths to drop.
#[derive(Debug, Clone, Default)]
pub(crate) struct Plan {
    pub writes: BTreeMap<String, PendingWrite>,
    pub removes: BTreeSet<String>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower to the tree engine's plan. Removes are inserted last, so a
    /// path staged both ways resolves to the remove.
    pub fn to_tree_plan(&self) -> TreePlan {
        let mut plan = TreePlan::new();
        for (path, pw) in &self.writes {
            plan.insert(
                path.clone(),
                TreeOp::Put {
                    oid: pw.oid,
                    mode: pw.mode,
                },
            );
        }
        for path in &self.removes {
            plan.insert(path.clone(), TreeOp::Drop);
        }
        plan
    }
}

/// Result of a ref advancement. For a no-op (empty report) the commit and
/// tree ids are the ones the snapshot started from.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub commit_oid: git2::Oid,
    pub tree_oid: git2::Oid,
    pub report: ChangeReport,
}

/// Advance `branch` from `expected` by applying `plan`.
///
/// `extra` carries planner-collected errors/warnings into the final report.
/// The commit message is `message`, or derived from the report with
/// `operation` as the batch label.
pub(crate) fn advance(
    shared: &StoreShared,
    branch: &str,
    expected: git2::Oid,
    base_tree: git2::Oid,
    plan: &Plan,
    message: Option<String>,
    operation: Option<&str>,
    extra: ChangeReport,
) -> Result<Outcome> {
    let refname = format!("refs/heads/{}", branch);
    let repo = shared.lock_repo()?;

    with_repo_lock(&shared.path, || {
        let current = read_tip(&repo, &refname, branch)?;
        if current != expected {
            log::debug!(
                "stale snapshot on {}: expected {} found {}",
                branch,
                expected,
                current
            );
            return Err(stale(branch, expected, current));
        }

        let mut report = crate::diff::report_for_plan(&repo, base_tree, plan)?;
        report.errors.extend(extra.errors);
        report.warnings.extend(extra.warnings);

        if report.in_sync() {
            return Ok(Outcome {
                commit_oid: current,
                tree_oid: base_tree,
                report,
            });
        }

        // Store the staged bytes, then rebuild the touched ancestor chain.
        for pw in plan.writes.values() {
            if let Some(bytes) = &pw.bytes {
                repo.blob(bytes).map_err(Error::git)?;
            }
        }
        let new_tree = tree::apply_plan(&repo, base_tree, &plan.to_tree_plan())?;
        if new_tree == base_tree {
            return Ok(Outcome {
                commit_oid: current,
                tree_oid: base_tree,
                report,
            });
        }

        let msg = message.unwrap_or_else(|| report.commit_message(operation));
        let sig = shared.git_signature()?;
        let tree_obj = repo.find_tree(new_tree).map_err(Error::git)?;
        let parent = repo.find_commit(current).map_err(Error::git)?;
        let commit_oid = repo
            .commit(None, &sig, &sig, &msg, &tree_obj, &[&parent])
            .map_err(Error::git)?;

        let log_msg = format!("commit: {}", msg);
        repo.reference(&refname, commit_oid, true, &log_msg)
            .map_err(Error::git)?;
        crate::reflog::append(
            &shared.path,
            &refname,
            &ReflogEntry {
                old_oid: current.to_string(),
                new_oid: commit_oid.to_string(),
                committer: shared.signature.identity(),
                timestamp: shared.clock.now(),
                message: log_msg,
            },
        )?;

        log::debug!("advanced {} {} -> {}", branch, current, commit_oid);
        Ok(Outcome {
            commit_oid,
            tree_oid: new_tree,
            report,
        })
    })
}

/// Move `branch` from `expected` to the existing commit `target` (undo /
/// redo). Same protocol as [`advance`], without creating objects.
pub(crate) fn move_branch(
    shared: &StoreShared,
    branch: &str,
    expected: git2::Oid,
    target: git2::Oid,
    log_message: &str,
) -> Result<()> {
    let refname = format!("refs/heads/{}", branch);
    let repo = shared.lock_repo()?;

    with_repo_lock(&shared.path, || {
        let current = read_tip(&repo, &refname, branch)?;
        if current != expected {
            return Err(stale(branch, expected, current));
        }

        repo.reference(&refname, target, true, log_message)
            .map_err(Error::git)?;
        crate::reflog::append(
            &shared.path,
            &refname,
            &ReflogEntry {
                old_oid: current.to_string(),
                new_oid: target.to_string(),
                committer: shared.signature.identity(),
                timestamp: shared.clock.now(),
                message: log_message.to_string(),
            },
        )?;
        log::debug!("moved {} {} -> {} ({})", branch, current, target, log_message);
        Ok(())
    })
}

fn read_tip(repo: &git2::Repository, refname: &str, branch: &str) -> Result<git2::Oid> {
    let reference = repo
        .find_reference(refname)
        .map_err(|_| Error::not_found(format!("branch {:?} not found", branch)))?;
    reference
        .target()
        .ok_or_else(|| Error::git_msg(format!("{} is unexpectedly symbolic", refname)))
}

fn stale(branch: &str, expected: git2::Oid, current: git2::Oid) -> Error {
    Error::stale_snapshot(format!(
        "branch {:?} has moved: expected {}, found {}",
        branch, expected, current
    ))
}
