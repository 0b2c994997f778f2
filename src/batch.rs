//! Transactional write accumulation.
//!
//! A [`Batch`] stages writes and removes against a base snapshot and
//! commits them as one transaction. Staging is last-op-wins per path; the
//! batch moves `Open -> Closed` exactly once (committing consumes it, and
//! [`Snapshot::with_batch`](crate::Snapshot::with_batch) guarantees the
//! commit on every successful exit path).

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{Error, Result};
use crate::snapshot::{BatchOptions, Snapshot};
use crate::tree;
use crate::types::{ChangeReport, MODE_BLOB, MODE_LINK};
use crate::update::{PendingWrite, Plan};

/// Accumulates writes/removes over a snapshot and commits them atomically.
pub struct Batch {
    base: Snapshot,
    writes: BTreeMap<String, PendingWrite>,
    removes: BTreeSet<String>,
    message: Option<String>,
    operation: Option<String>,
    closed: bool,
}

impl Batch {
    pub(crate) fn new(base: Snapshot, opts: BatchOptions) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
            removes: BTreeSet::new(),
            message: opts.message,
            operation: opts.operation,
            closed: false,
        }
    }

    fn require_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::BatchClosed)
        } else {
            Ok(())
        }
    }

    /// The snapshot this batch was opened on.
    pub fn base(&self) -> &Snapshot {
        &self.base
    }

    /// Stage raw bytes at `path` with the default blob mode.
    pub fn write(&mut self, path: &str, data: &[u8]) -> Result<()> {
        self.write_with_mode(path, data, MODE_BLOB)
    }

    /// Stage raw bytes at `path` with an explicit filemode. A later write
    /// to the same path replaces this one; a later remove clears it.
    pub fn write_with_mode(&mut self, path: &str, data: &[u8], mode: u32) -> Result<()> {
        self.require_open()?;
        let path = crate::path::normalize(path)?;
        if path.is_empty() {
            return Err(Error::invalid_path("cannot write to the root path"));
        }
        let pw = PendingWrite::from_bytes(data.to_vec(), mode)?;
        self.removes.remove(&path);
        self.writes.insert(path, pw);
        Ok(())
    }

    /// Stage UTF-8 text at `path`.
    pub fn write_text(&mut self, path: &str, text: &str) -> Result<()> {
        self.write(path, text.as_bytes())
    }

    /// Stage the contents of a local file, preserving symlink-ness and the
    /// executable bit.
    pub fn write_from_file(&mut self, path: &str, src: &Path) -> Result<()> {
        self.require_open()?;
        let mode = tree::mode_from_disk(src)?;
        let data = if mode == MODE_LINK {
            let target = std::fs::read_link(src).map_err(|e| Error::io(src, e))?;
            target.to_string_lossy().into_owned().into_bytes()
        } else {
            std::fs::read(src).map_err(|e| Error::io(src, e))?
        };
        self.write_with_mode(path, &data, mode)
    }

    /// Stage a symlink at `path`.
    pub fn write_symlink(&mut self, path: &str, target: &str) -> Result<()> {
        self.write_with_mode(path, target.as_bytes(), MODE_LINK)
    }

    /// Stage the removal of `path`.
    ///
    /// # Errors
    /// [`Error::NotFound`] when `path` neither exists in the base tree nor
    /// is staged as a write; [`Error::IsADirectory`] for directories;
    /// batches stay at single-file granularity, use
    /// [`Snapshot::remove`](crate::Snapshot::remove) or
    /// [`Snapshot::apply`](crate::Snapshot::apply) for recursive removal.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        self.require_open()?;
        let path = crate::path::normalize(path)?;

        let node = self
            .base
            .shared
            .with_repo(|repo| tree::lookup(repo, self.base.tree_oid, &path))?;
        if let Some(n) = &node {
            if n.is_tree() {
                return Err(Error::is_a_directory(&path));
            }
        }

        let had_pending = self.writes.remove(&path).is_some();
        match node {
            Some(_) => {
                self.removes.insert(path);
            }
            None if had_pending => {
                // The pending write was the only thing to undo.
            }
            None => return Err(Error::not_found(&path)),
        }
        Ok(())
    }

    /// A buffered writer staging a single write at `path` when closed.
    pub fn writer(&mut self, path: &str) -> Result<crate::writer::BatchWriter<'_>> {
        self.require_open()?;
        let path = crate::path::normalize(path)?;
        Ok(crate::writer::BatchWriter::new(self, path))
    }

    /// Number of staged writes and removes.
    pub fn len(&self) -> usize {
        self.writes.len() + self.removes.len()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.removes.is_empty()
    }

    /// Whether this batch was committed or aborted.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Commit everything staged in one transaction, consuming the batch.
    ///
    /// An empty batch creates no commit and returns the base snapshot.
    pub fn commit(mut self) -> Result<Snapshot> {
        self.closed = true;

        if self.is_empty() {
            return Ok(self.base.clone());
        }

        let plan = Plan {
            writes: std::mem::take(&mut self.writes),
            removes: std::mem::take(&mut self.removes),
        };
        self.base.commit_plan(
            plan,
            self.message.clone(),
            self.operation.as_deref(),
            ChangeReport::new(),
            false,
        )
    }

    /// Discard everything staged, consuming the batch.
    pub fn abort(mut self) {
        self.closed = true;
        self.writes.clear();
        self.removes.clear();
    }
}
