//! A versioned object store backed by a bare git repository.
//!
//! `vost` exposes a directory-tree filesystem whose every mutation produces
//! a new immutable snapshot, persisted as a commit. You get auditable
//! history, cheap branching and tagging, deduplicated storage, and atomic
//! multi-file updates, all without a working copy, and in a repository any
//! standard git tooling can read.
//!
//! # Key types
//!
//! - [`Store`]: opens (or creates) the bare repository; hands out
//!   branches, tags, and notes.
//! - [`Snapshot`]: an immutable view of one commit's tree. Reads never
//!   change it; writes commit and return a **new** snapshot.
//! - [`Batch`]: accumulates writes/removes and commits them in one
//!   transaction.
//! - [`RefDict`]: dictionary access to branches or tags.
//! - [`NoteNamespace`]: commit-addressed notes under `refs/notes/`.
//!
//! # Quick example
//!
//! ```rust,no_run
//! use vost::{OpenOptions, Store, WriteOptions};
//!
//! let store = Store::open(
//!     "/tmp/data.git",
//!     OpenOptions { create: true, ..Default::default() },
//! )
//! .unwrap();
//!
//! let snap = store.branches().get("main").unwrap();
//! let snap = snap
//!     .write("greeting.txt", b"hello", WriteOptions::default())
//!     .unwrap();
//! assert_eq!(snap.read_text("greeting.txt").unwrap(), "hello");
//!
//! // The previous snapshot still sees the old tree.
//! assert!(store.branches().get("main").unwrap().exists("greeting.txt").unwrap());
//! ```
//!
//! # Concurrency
//!
//! Writers are optimistic: each write commits against the tip its snapshot
//! was taken from. If the branch moved, the write fails with
//! [`Error::StaleSnapshot`] and can be retried after re-fetching (see
//! [`retry_write`]). All mutations serialize on a repository-wide advisory
//! lock, across threads and processes.

pub mod batch;
pub mod copy;
mod diff;
pub mod error;
pub mod exclude;
pub mod glob;
pub mod lock;
mod mirror;
pub mod notes;
pub mod path;
pub mod refs;
pub mod reflog;
pub mod snapshot;
pub mod store;
mod tree;
pub mod types;
mod update;
pub mod writer;

pub use batch::Batch;
pub use copy::{disk_glob, CopyFromRefOptions, CopyInOptions, CopyOutOptions, SyncOptions};
pub use error::{Error, Result};
pub use exclude::ExcludeFilter;
pub use notes::{NoteNamespace, NoteTarget, Notes, NotesBatch};
pub use refs::RefDict;
pub use snapshot::{
    retry_write, ApplyOptions, BatchOptions, History, LogOptions, MoveOptions, RemoveOptions,
    Snapshot, WriteOptions,
};
pub use store::Store;
pub use types::*;
pub use writer::{BatchWriter, SnapshotWriter};
