//! Shared value types: file modes, tree entries, change reports, reflog
//! entries, and option structs.

use std::path::PathBuf;

/// Regular (non-executable) blob mode.
pub const MODE_BLOB: u32 = 0o100644;
/// Executable blob mode.
pub const MODE_BLOB_EXEC: u32 = 0o100755;
/// Symbolic link mode.
pub const MODE_LINK: u32 = 0o120000;
/// Tree (directory) mode.
pub const MODE_TREE: u32 = 0o040000;

// ---------------------------------------------------------------------------
// FileType
// ---------------------------------------------------------------------------

/// The type of a tree entry, decoded from its git filemode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Regular file (`0o100644`).
    Blob,
    /// Executable file (`0o100755`).
    Executable,
    /// Symbolic link (`0o120000`).
    Link,
    /// Directory (`0o040000`).
    Tree,
}

impl FileType {
    /// Decode a raw filemode, or `None` for modes vost does not produce.
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode {
            MODE_BLOB => Some(Self::Blob),
            MODE_BLOB_EXEC => Some(Self::Executable),
            MODE_LINK => Some(Self::Link),
            MODE_TREE => Some(Self::Tree),
            _ => None,
        }
    }

    /// The raw git filemode for this type.
    pub fn filemode(self) -> u32 {
        match self {
            Self::Blob => MODE_BLOB,
            Self::Executable => MODE_BLOB_EXEC,
            Self::Link => MODE_LINK,
            Self::Tree => MODE_TREE,
        }
    }

    pub fn is_file(self) -> bool {
        matches!(self, Self::Blob | Self::Executable)
    }

    pub fn is_dir(self) -> bool {
        matches!(self, Self::Tree)
    }

    pub fn is_link(self) -> bool {
        matches!(self, Self::Link)
    }
}

// ---------------------------------------------------------------------------
// Tree entries
// ---------------------------------------------------------------------------

/// A named entry of a tree, as returned by `listdir` and `walk`.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Entry basename.
    pub name: String,
    /// Object id of the entry.
    pub oid: git2::Oid,
    /// Raw git filemode.
    pub mode: u32,
}

impl TreeEntry {
    /// The decoded [`FileType`], or `None` for unknown modes.
    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_mode(self.mode)
    }
}

/// One directory visited during an os.walk-style traversal: the directory
/// path, its subdirectory names, and its non-directory entries.
#[derive(Debug, Clone)]
pub struct WalkDir {
    /// Directory path relative to the walk root (empty for the root itself).
    pub dirpath: String,
    /// Names of immediate subdirectories.
    pub dirs: Vec<String>,
    /// Immediate non-directory entries.
    pub files: Vec<TreeEntry>,
}

// ---------------------------------------------------------------------------
// Stat
// ---------------------------------------------------------------------------

/// Single-call metadata for a path, shaped for getattr-style consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// Raw git filemode.
    pub mode: u32,
    /// Decoded file type.
    pub file_type: FileType,
    /// Blob length in bytes; 0 for trees.
    pub size: u64,
    /// 40-char hex id of the object.
    pub oid: String,
    /// 1 for files and links; `2 + direct subtree count` for trees.
    pub nlink: u32,
    /// Committer timestamp of the owning commit (epoch seconds).
    pub mtime: u64,
}

// ---------------------------------------------------------------------------
// WriteEntry
// ---------------------------------------------------------------------------

/// Content staged for a single path in `apply` or a copy plan.
///
/// The variants are mutually exclusive by construction: a symlink carries
/// only its target, a pre-hashed entry references a blob already present in
/// the object store.
#[derive(Debug, Clone)]
pub enum WriteEntry {
    /// Raw bytes, with an optional filemode (defaults to [`MODE_BLOB`]).
    Data { bytes: Vec<u8>, mode: Option<u32> },
    /// Symbolic link with the given target.
    Symlink { target: String },
    /// A blob already in the object store, referenced by id.
    PreHashed { oid: git2::Oid, mode: Option<u32> },
}

impl WriteEntry {
    /// Blob entry from raw bytes with the default mode.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Data {
            bytes: data.into(),
            mode: None,
        }
    }

    /// Blob entry from a UTF-8 string.
    pub fn text(text: impl Into<String>) -> Self {
        Self::bytes(text.into().into_bytes())
    }

    /// Executable blob entry.
    pub fn executable(data: impl Into<Vec<u8>>) -> Self {
        Self::Data {
            bytes: data.into(),
            mode: Some(MODE_BLOB_EXEC),
        }
    }

    /// Symlink entry.
    pub fn symlink(target: impl Into<String>) -> Self {
        Self::Symlink {
            target: target.into(),
        }
    }

    /// Entry referencing an existing blob by id.
    pub fn pre_hashed(oid: git2::Oid, mode: Option<u32>) -> Self {
        Self::PreHashed { oid, mode }
    }

    /// The effective filemode of this entry.
    pub fn mode(&self) -> u32 {
        match self {
            Self::Data { mode, .. } | Self::PreHashed { mode, .. } => mode.unwrap_or(MODE_BLOB),
            Self::Symlink { .. } => MODE_LINK,
        }
    }
}

// ---------------------------------------------------------------------------
// Change reports
// ---------------------------------------------------------------------------

/// A leaf file mentioned in a [`ChangeReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path within the store.
    pub path: String,
    /// Type of the file.
    pub file_type: FileType,
    /// Local source path, when the change originated on disk.
    pub src: Option<PathBuf>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, file_type: FileType) -> Self {
        Self {
            path: path.into(),
            file_type,
            src: None,
        }
    }

    pub fn with_src(path: impl Into<String>, file_type: FileType, src: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_type,
            src: Some(src.into()),
        }
    }
}

impl PartialOrd for FileEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path.cmp(&other.path)
    }
}

/// Classification of a single change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

impl ChangeKind {
    fn sign(self) -> char {
        match self {
            Self::Add => '+',
            Self::Update => '~',
            Self::Delete => '-',
        }
    }
}

/// One `(kind, path)` pair from [`ChangeReport::actions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeAction {
    pub kind: ChangeKind,
    pub path: String,
}

impl PartialOrd for ChangeAction {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChangeAction {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path.cmp(&other.path)
    }
}

/// A non-fatal per-path failure recorded during a copy/sync operation.
#[derive(Debug, Clone)]
pub struct PathError {
    pub path: String,
    pub message: String,
}

impl PathError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Minimal file-level difference report produced by the change detector and
/// by copy/sync/move/remove operations.
///
/// The three change lists are pairwise disjoint on `path` and hold entries
/// in detection order; [`actions`](Self::actions) sorts by path.
#[derive(Debug, Clone, Default)]
pub struct ChangeReport {
    pub add: Vec<FileEntry>,
    pub update: Vec<FileEntry>,
    pub delete: Vec<FileEntry>,
    /// Per-path failures tolerated under `ignore_errors`.
    pub errors: Vec<PathError>,
    /// Non-fatal observations (e.g. skipped dangling symlinks).
    pub warnings: Vec<PathError>,
}

impl ChangeReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when no changes were detected.
    pub fn in_sync(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Total change count across all three lists.
    pub fn total(&self) -> usize {
        self.add.len() + self.update.len() + self.delete.len()
    }

    /// All changes as `(kind, path)` pairs, sorted by path.
    pub fn actions(&self) -> Vec<ChangeAction> {
        let mut out = Vec::with_capacity(self.total());
        for fe in &self.add {
            out.push(ChangeAction {
                kind: ChangeKind::Add,
                path: fe.path.clone(),
            });
        }
        for fe in &self.update {
            out.push(ChangeAction {
                kind: ChangeKind::Update,
                path: fe.path.clone(),
            });
        }
        for fe in &self.delete {
            out.push(ChangeAction {
                kind: ChangeKind::Delete,
                path: fe.path.clone(),
            });
        }
        out.sort();
        out
    }

    /// Derive a commit message from this report.
    ///
    /// Empty report: `"No changes"`. A single change: `"+ path"`,
    /// `"~ path"`, or `"- path"`, with `" (link)"` / `" (executable)"`
    /// appended for non-regular types. Multiple changes:
    /// `"Batch: +N ~N -N"`, or `"Batch <op>: ..."` when `operation` is set.
    pub fn commit_message(&self, operation: Option<&str>) -> String {
        match self.total() {
            0 => "No changes".to_string(),
            1 => {
                let (kind, entry) = if let Some(fe) = self.add.first() {
                    (ChangeKind::Add, fe)
                } else if let Some(fe) = self.update.first() {
                    (ChangeKind::Update, fe)
                } else {
                    (ChangeKind::Delete, &self.delete[0])
                };
                let suffix = match entry.file_type {
                    FileType::Link => " (link)",
                    FileType::Executable => " (executable)",
                    _ => "",
                };
                format!("{} {}{}", kind.sign(), entry.path, suffix)
            }
            _ => {
                let op = operation.map(|o| format!(" {}", o)).unwrap_or_default();
                format!(
                    "Batch{}: +{} ~{} -{}",
                    op,
                    self.add.len(),
                    self.update.len(),
                    self.delete.len()
                )
            }
        }
    }

    /// Merge another report into this one.
    pub fn absorb(&mut self, other: ChangeReport) {
        self.add.extend(other.add);
        self.update.extend(other.update);
        self.delete.extend(other.delete);
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

// ---------------------------------------------------------------------------
// Identity / history
// ---------------------------------------------------------------------------

/// Committer/author identity used for commits.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            name: "vost".into(),
            email: "vost@localhost".into(),
        }
    }
}

impl Signature {
    /// The `"Name <email>"` form used in reflog lines.
    pub fn identity(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

/// One reflog line: a recorded ref transition.
#[derive(Debug, Clone)]
pub struct ReflogEntry {
    /// Previous tip (40 zeros on creation).
    pub old_oid: String,
    /// New tip.
    pub new_oid: String,
    /// `"Name <email>"` of the committer.
    pub committer: String,
    /// Epoch seconds of the transition.
    pub timestamp: u64,
    /// Transition message (e.g. `"commit: + a.txt"`).
    pub message: String,
}

// ---------------------------------------------------------------------------
// Mirror types
// ---------------------------------------------------------------------------

/// A ref-level change between two repositories.
#[derive(Debug, Clone)]
pub struct RefChange {
    /// Full ref name (e.g. `"refs/heads/main"`).
    pub ref_name: String,
    /// Previous target, or `None` for newly created refs.
    pub old_target: Option<String>,
    /// New target, or `None` for deleted refs.
    pub new_target: Option<String>,
}

/// Ref-level diff between two repositories, as computed by backup/restore.
#[derive(Debug, Clone, Default)]
pub struct MirrorDiff {
    pub add: Vec<RefChange>,
    pub update: Vec<RefChange>,
    pub delete: Vec<RefChange>,
}

impl MirrorDiff {
    pub fn in_sync(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    pub fn total(&self) -> usize {
        self.add.len() + self.update.len() + self.delete.len()
    }
}

// ---------------------------------------------------------------------------
// Option structs
// ---------------------------------------------------------------------------

/// Options for [`Store::open`](crate::Store::open).
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Create the repository if it does not exist.
    pub create: bool,
    /// Branch to initialize on creation (`"main"` if unset).
    pub branch: Option<String>,
    /// Committer name override.
    pub author: Option<String>,
    /// Committer email override.
    pub email: Option<String>,
    /// Pin the commit clock to a fixed epoch timestamp (deterministic tests).
    pub timestamp: Option<u64>,
}

/// Options for [`Store::backup`](crate::Store::backup).
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Compute the diff but transfer nothing.
    pub dry_run: bool,
    /// Restrict to these refs (short or full names). Disables deletes.
    pub refs: Option<Vec<String>>,
    /// Force `"bundle"` output; auto-detected from a `.bundle` extension.
    pub format: Option<String>,
}

/// Options for [`Store::restore`](crate::Store::restore).
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Compute the diff but transfer nothing.
    pub dry_run: bool,
    /// Restrict to these refs (short or full names).
    pub refs: Option<Vec<String>>,
    /// Force `"bundle"` input; auto-detected from a `.bundle` extension.
    pub format: Option<String>,
}
