//! Append-only per-ref logs at `<gitdir>/logs/<refname>`.
//!
//! Lines use git's reflog format:
//! `<old> <new> <name> <email> <unix_ts> <tz>\t<message>`. vost writes every
//! branch transition itself (under the advisory lock) rather than relying on
//! the object store's automatic logging, so entry content and ordering stay
//! under the ref updater's control.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::ReflogEntry;

/// The all-zeros id denoting "no previous commit".
pub const ZERO_OID: &str = "0000000000000000000000000000000000000000";

fn log_path(gitdir: &Path, refname: &str) -> PathBuf {
    gitdir.join("logs").join(refname)
}

/// Whether a reflog file exists for `refname`.
pub fn exists(gitdir: &Path, refname: &str) -> bool {
    log_path(gitdir, refname).is_file()
}

/// Read the reflog for `refname`, most recent entry first.
///
/// # Errors
/// [`Error::NotFound`] if the ref has no log file.
pub fn read(gitdir: &Path, refname: &str) -> Result<Vec<ReflogEntry>> {
    let path = log_path(gitdir, refname);
    if !path.is_file() {
        return Err(Error::not_found(format!("no reflog for {}", refname)));
    }

    let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
    let mut entries: Vec<ReflogEntry> = content.lines().filter_map(parse_line).collect();
    entries.reverse();
    Ok(entries)
}

/// Like [`read`], but an absent log file yields an empty list.
pub fn read_or_empty(gitdir: &Path, refname: &str) -> Result<Vec<ReflogEntry>> {
    if !exists(gitdir, refname) {
        return Ok(Vec::new());
    }
    read(gitdir, refname)
}

fn parse_line(line: &str) -> Option<ReflogEntry> {
    if line.is_empty() {
        return None;
    }
    let (head, message) = line.split_once('\t').unwrap_or((line, ""));

    let (old_oid, rest) = head.split_once(' ')?;
    let (new_oid, identity) = rest.split_once(' ')?;

    // identity is "Name <email> <ts> <tz>"; peel the trailing two tokens.
    let tz_split = identity.rfind(' ')?;
    let ts_split = identity[..tz_split].rfind(' ')?;
    let timestamp = identity[ts_split + 1..tz_split].parse::<u64>().ok()?;
    let committer = identity[..ts_split].to_string();

    Some(ReflogEntry {
        old_oid: old_oid.to_string(),
        new_oid: new_oid.to_string(),
        committer,
        timestamp,
        message: message.to_string(),
    })
}

/// Append one entry to the reflog for `refname`, creating parent
/// directories as needed. Callers hold the repository lock.
pub fn append(gitdir: &Path, refname: &str, entry: &ReflogEntry) -> Result<()> {
    let path = log_path(gitdir, refname);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| Error::io(&path, e))?;

    writeln!(
        file,
        "{} {} {} {} +0000\t{}",
        entry.old_oid, entry.new_oid, entry.committer, entry.timestamp, entry.message,
    )
    .map_err(|e| Error::io(&path, e))?;

    Ok(())
}

/// Remove the log file for `refname`, if present. Used on branch deletion.
pub fn remove(gitdir: &Path, refname: &str) -> Result<()> {
    let path = log_path(gitdir, refname);
    if path.is_file() {
        std::fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_standard_line() {
        let e = parse_line(
            "0000000000000000000000000000000000000000 \
             1111111111111111111111111111111111111111 \
             vost <vost@localhost> 1700000000 +0000\tcommit: + a.txt",
        )
        .unwrap();
        assert_eq!(e.old_oid, ZERO_OID);
        assert_eq!(e.new_oid.len(), 40);
        assert_eq!(e.committer, "vost <vost@localhost>");
        assert_eq!(e.timestamp, 1700000000);
        assert_eq!(e.message, "commit: + a.txt");
    }

    #[test]
    fn parse_name_with_spaces() {
        let e = parse_line(
            "1111111111111111111111111111111111111111 \
             2222222222222222222222222222222222222222 \
             Ada B. Lovelace <ada@example.com> 1700000001 -0500\tundo: 1 commit(s)",
        )
        .unwrap();
        assert_eq!(e.committer, "Ada B. Lovelace <ada@example.com>");
        assert_eq!(e.timestamp, 1700000001);
    }

    #[test]
    fn read_roundtrip_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let entry = |n: u64, msg: &str| ReflogEntry {
            old_oid: ZERO_OID.into(),
            new_oid: format!("{:040x}", n),
            committer: "vost <vost@localhost>".into(),
            timestamp: 1700000000 + n,
            message: msg.into(),
        };
        append(dir.path(), "refs/heads/main", &entry(1, "first")).unwrap();
        append(dir.path(), "refs/heads/main", &entry(2, "second")).unwrap();

        let entries = read(dir.path(), "refs/heads/main").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[1].message, "first");
    }

    #[test]
    fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(dir.path(), "refs/heads/none").is_err());
        assert!(read_or_empty(dir.path(), "refs/heads/none")
            .unwrap()
            .is_empty());
    }
}
