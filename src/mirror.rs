//! Ref replication: backup to and restore from another bare repository or
//! a v2 bundle file.
//!
//! Backup without a ref filter mirrors (remote-only refs are deleted);
//! with a filter it pushes only the named refs and never deletes. Restore
//! is always additive. Every operation computes a [`MirrorDiff`] first and
//! honors `dry_run`.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{BackupOptions, MirrorDiff, RefChange, RestoreOptions};

// ---------------------------------------------------------------------------
// URL handling
// ---------------------------------------------------------------------------

fn is_local(url: &str) -> bool {
    !url.starts_with("http://")
        && !url.starts_with("https://")
        && !url.starts_with("git://")
        && !url.starts_with("ssh://")
}

fn local_path(url: &str) -> &str {
    url.strip_prefix("file://").unwrap_or(url)
}

/// scp-style `user@host:path` syntax is ambiguous with local paths; demand
/// explicit `ssh://`.
fn reject_scp(url: &str) -> Result<()> {
    if !is_local(url) || url.starts_with("file://") {
        return Ok(());
    }
    let host_part = url.splitn(2, '@').last().unwrap_or(url);
    if let Some(colon) = host_part.find(':') {
        let before = &host_part[..colon];
        if colon > 1 && !before.contains('/') && !before.contains('\\') {
            return Err(Error::invalid_argument(format!(
                "scp-style URL not supported: {:?} (use ssh://)",
                url
            )));
        }
    }
    Ok(())
}

fn is_bundle(url: &str) -> bool {
    url.to_lowercase().ends_with(".bundle")
}

fn ensure_bare_repo(url: &str) -> Result<()> {
    if !is_local(url) {
        return Ok(());
    }
    let path = Path::new(local_path(url));
    if path.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|e| Error::io(path, e))?;
    git2::Repository::init_bare(path).map_err(Error::git)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Ref enumeration and name resolution
// ---------------------------------------------------------------------------

/// Expand short names against the available refs: `refs/...` passes
/// through, otherwise the heads/tags/notes prefixes are probed, falling
/// back to `refs/heads/`.
fn expand_ref_names(names: &[String], available: &HashMap<String, String>) -> HashSet<String> {
    let mut out = HashSet::new();
    for name in names {
        if name.starts_with("refs/") {
            out.insert(name.clone());
            continue;
        }
        let found = ["refs/heads/", "refs/tags/", "refs/notes/"]
            .iter()
            .map(|p| format!("{}{}", p, name))
            .find(|candidate| available.contains_key(candidate));
        out.insert(found.unwrap_or_else(|| format!("refs/heads/{}", name)));
    }
    out
}

fn local_refs(repo_path: &Path) -> Result<HashMap<String, String>> {
    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    let mut refs = HashMap::new();
    for reference in repo.references().map_err(Error::git)?.flatten() {
        let Some(name) = reference.name() else {
            continue;
        };
        if name == "HEAD" {
            continue;
        }
        let target = reference
            .target()
            .or_else(|| reference.resolve().ok().and_then(|r| r.target()));
        if let Some(oid) = target {
            refs.insert(name.to_string(), oid.to_string());
        }
    }
    Ok(refs)
}

fn remote_refs(repo_path: &Path, url: &str) -> Result<HashMap<String, String>> {
    if is_local(url) || url.starts_with("file://") {
        let path = Path::new(local_path(url));
        if !path.exists() {
            return Ok(HashMap::new());
        }
        return local_refs(path);
    }

    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    let Ok(mut remote) = repo.remote_anonymous(url) else {
        return Ok(HashMap::new());
    };
    if remote.connect(git2::Direction::Fetch).is_err() {
        return Ok(HashMap::new());
    }

    let mut refs = HashMap::new();
    if let Ok(heads) = remote.list() {
        for head in heads {
            let name = head.name();
            if name == "HEAD" || name.ends_with("^{}") {
                continue;
            }
            refs.insert(name.to_string(), head.oid().to_string());
        }
    }
    let _ = remote.disconnect();
    Ok(refs)
}

fn diff_refs(src: &HashMap<String, String>, dest: &HashMap<String, String>) -> MirrorDiff {
    let mut diff = MirrorDiff::default();

    for (name, oid) in src {
        match dest.get(name) {
            None => diff.add.push(RefChange {
                ref_name: name.clone(),
                old_target: None,
                new_target: Some(oid.clone()),
            }),
            Some(have) if have != oid => diff.update.push(RefChange {
                ref_name: name.clone(),
                old_target: Some(have.clone()),
                new_target: Some(oid.clone()),
            }),
            _ => {}
        }
    }
    for (name, oid) in dest {
        if !src.contains_key(name) {
            diff.delete.push(RefChange {
                ref_name: name.clone(),
                old_target: Some(oid.clone()),
                new_target: None,
            });
        }
    }
    diff
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Force-push every local ref; delete remote-only refs.
fn mirror_push(
    repo_path: &Path,
    url: &str,
    locals: &HashMap<String, String>,
    remotes: &HashMap<String, String>,
) -> Result<()> {
    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    let mut remote = repo.remote_anonymous(url).map_err(Error::git)?;

    let mut refspecs: Vec<String> = locals.keys().map(|r| format!("+{}:{}", r, r)).collect();
    for name in remotes.keys() {
        if !locals.contains_key(name) {
            refspecs.push(format!(":{}", name));
        }
    }
    let specs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
    remote.push(&specs, None).map_err(Error::git)?;
    Ok(())
}

/// Force-push only the refs in `filter`.
fn targeted_push(repo_path: &Path, url: &str, filter: &HashSet<String>) -> Result<()> {
    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    let mut remote = repo.remote_anonymous(url).map_err(Error::git)?;
    let refspecs: Vec<String> = filter.iter().map(|r| format!("+{}:{}", r, r)).collect();
    let specs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
    remote.push(&specs, None).map_err(Error::git)?;
    Ok(())
}

/// Fetch refs without ever deleting local ones.
fn additive_fetch(repo_path: &Path, url: &str, refs: Option<&[String]>) -> Result<()> {
    let available = remote_refs(repo_path, url)?;
    if available.is_empty() {
        return Ok(());
    }

    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    let mut remote = repo.remote_anonymous(url).map_err(Error::git)?;

    let wanted: Vec<&String> = match refs {
        Some(filter) => {
            let resolved = expand_ref_names(filter, &available);
            available
                .keys()
                .filter(|k| resolved.contains(k.as_str()))
                .collect()
        }
        None => available.keys().collect(),
    };
    if wanted.is_empty() {
        return Ok(());
    }

    let refspecs: Vec<String> = wanted.iter().map(|r| format!("+{}:{}", r, r)).collect();
    let specs: Vec<&str> = refspecs.iter().map(String::as_str).collect();
    remote.fetch(&specs, None, None).map_err(Error::git)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Bundles
// ---------------------------------------------------------------------------

const BUNDLE_SIGNATURE: &[u8] = b"# v2 git bundle\n";

/// Parse a v2 bundle header into its refs and the packfile offset.
/// Prerequisite lines and `HEAD` are skipped.
fn parse_bundle_header(data: &[u8]) -> Result<(HashMap<String, String>, usize)> {
    if data.len() < BUNDLE_SIGNATURE.len() || &data[..BUNDLE_SIGNATURE.len()] != BUNDLE_SIGNATURE {
        return Err(Error::invalid_argument("not a v2 git bundle"));
    }

    let header_end = data
        .windows(2)
        .position(|w| w == b"\n\n")
        .ok_or_else(|| Error::invalid_argument("bundle header is unterminated"))?;

    let header = String::from_utf8_lossy(&data[BUNDLE_SIGNATURE.len()..header_end]);
    let mut refs = HashMap::new();
    for line in header.lines() {
        if line.is_empty() || line.starts_with('-') {
            continue;
        }
        let Some((oid, name)) = line.split_once(' ') else {
            continue;
        };
        if name == "HEAD" || name.ends_with("^{}") || oid.is_empty() {
            continue;
        }
        refs.insert(name.to_string(), oid.to_string());
    }

    Ok((refs, header_end + 2))
}

/// Write the selected refs and their full ancestry to a v2 bundle file.
pub(crate) fn bundle_export(repo_path: &Path, path: &str, refs: Option<&[String]>) -> Result<()> {
    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    let all = local_refs(repo_path)?;

    let selected: HashMap<String, String> = match refs {
        Some(filter) => {
            let resolved = expand_ref_names(filter, &all);
            all.into_iter().filter(|(k, _)| resolved.contains(k)).collect()
        }
        None => all,
    };
    if selected.is_empty() {
        return Err(Error::invalid_argument("no refs to export"));
    }

    // A revwalk feeds the packbuilder so parent commits come along, not
    // just the tips.
    let mut builder = repo.packbuilder().map_err(Error::git)?;
    let mut walk = repo.revwalk().map_err(Error::git)?;
    for oid_hex in selected.values() {
        let oid = git2::Oid::from_str(oid_hex).map_err(Error::git)?;
        walk.push(oid).map_err(Error::git)?;
    }
    builder.insert_walk(&mut walk).map_err(Error::git)?;

    let mut pack = git2::Buf::new();
    builder.write_buf(&mut pack).map_err(Error::git)?;

    let mut header = String::from_utf8_lossy(BUNDLE_SIGNATURE).into_owned();
    for (name, oid) in &selected {
        header.push_str(oid);
        header.push(' ');
        header.push_str(name);
        header.push('\n');
    }
    header.push('\n');

    let out = Path::new(path);
    let mut file = std::fs::File::create(out).map_err(|e| Error::io(out, e))?;
    file.write_all(header.as_bytes()).map_err(|e| Error::io(out, e))?;
    file.write_all(&pack).map_err(|e| Error::io(out, e))?;
    Ok(())
}

/// Index a bundle's packfile into the object store and create its refs.
/// Additive: existing local-only refs survive.
pub(crate) fn bundle_import(repo_path: &Path, path: &str, refs: Option<&[String]>) -> Result<()> {
    let data = std::fs::read(path).map_err(|e| Error::io(Path::new(path), e))?;
    let (all, pack_offset) = parse_bundle_header(&data)?;

    let selected: HashMap<String, String> = match refs {
        Some(filter) => {
            let resolved = expand_ref_names(filter, &all);
            all.into_iter().filter(|(k, _)| resolved.contains(k)).collect()
        }
        None => all,
    };
    if selected.is_empty() {
        return Ok(());
    }

    let pack_dir = repo_path.join("objects").join("pack");
    std::fs::create_dir_all(&pack_dir).map_err(|e| Error::io(&pack_dir, e))?;

    let mut indexer = git2::Indexer::new(None, &pack_dir, 0, false).map_err(Error::git)?;
    indexer
        .write_all(&data[pack_offset..])
        .map_err(|e| Error::git_msg(format!("pack indexing failed: {}", e)))?;
    indexer.commit().map_err(Error::git)?;

    let repo = git2::Repository::open_bare(repo_path).map_err(Error::git)?;
    for (name, oid_hex) in &selected {
        let oid = git2::Oid::from_str(oid_hex).map_err(Error::git)?;
        repo.reference(name, oid, true, "bundle import")
            .map_err(Error::git)?;
    }
    Ok(())
}

fn diff_bundle_export(repo_path: &Path, refs: Option<&[String]>) -> Result<MirrorDiff> {
    let all = local_refs(repo_path)?;
    let selected: HashMap<String, String> = match refs {
        Some(filter) => {
            let resolved = expand_ref_names(filter, &all);
            all.into_iter().filter(|(k, _)| resolved.contains(k)).collect()
        }
        None => all,
    };
    Ok(MirrorDiff {
        add: selected
            .into_iter()
            .map(|(ref_name, oid)| RefChange {
                ref_name,
                old_target: None,
                new_target: Some(oid),
            })
            .collect(),
        update: Vec::new(),
        delete: Vec::new(),
    })
}

fn diff_bundle_import(repo_path: &Path, path: &str, refs: Option<&[String]>) -> Result<MirrorDiff> {
    let data = std::fs::read(path).map_err(|e| Error::io(Path::new(path), e))?;
    let (bundle, _) = parse_bundle_header(&data)?;
    let selected: HashMap<String, String> = match refs {
        Some(filter) => {
            let resolved = expand_ref_names(filter, &bundle);
            bundle
                .into_iter()
                .filter(|(k, _)| resolved.contains(k))
                .collect()
        }
        None => bundle,
    };

    let mut diff = diff_refs(&selected, &local_refs(repo_path)?);
    diff.delete.clear();
    Ok(diff)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// See [`Store::backup`](crate::Store::backup).
pub(crate) fn backup(repo_path: &Path, dest: &str, opts: &BackupOptions) -> Result<MirrorDiff> {
    reject_scp(dest)?;

    if opts.format.as_deref() == Some("bundle") || is_bundle(dest) {
        let diff = diff_bundle_export(repo_path, opts.refs.as_deref())?;
        if !opts.dry_run {
            bundle_export(repo_path, dest, opts.refs.as_deref())?;
        }
        return Ok(diff);
    }

    ensure_bare_repo(dest)?;
    let locals = local_refs(repo_path)?;
    let remotes = remote_refs(repo_path, dest)?;

    if let Some(filter) = &opts.refs {
        let selected = expand_ref_names(filter, &locals);
        let mut diff = diff_refs(&locals, &remotes);
        diff.add.retain(|c| selected.contains(&c.ref_name));
        diff.update.retain(|c| selected.contains(&c.ref_name));
        diff.delete.clear();

        if !opts.dry_run && !diff.in_sync() {
            targeted_push(repo_path, dest, &selected)?;
        }
        return Ok(diff);
    }

    let diff = diff_refs(&locals, &remotes);
    if !opts.dry_run && !diff.in_sync() {
        mirror_push(repo_path, dest, &locals, &remotes)?;
    }
    Ok(diff)
}

/// See [`Store::restore`](crate::Store::restore).
pub(crate) fn restore(repo_path: &Path, src: &str, opts: &RestoreOptions) -> Result<MirrorDiff> {
    reject_scp(src)?;

    if opts.format.as_deref() == Some("bundle") || is_bundle(src) {
        let diff = diff_bundle_import(repo_path, src, opts.refs.as_deref())?;
        if !opts.dry_run && !diff.in_sync() {
            bundle_import(repo_path, src, opts.refs.as_deref())?;
        }
        return Ok(diff);
    }

    let remotes = remote_refs(repo_path, src)?;
    let mut diff = diff_refs(&remotes, &local_refs(repo_path)?);
    if let Some(filter) = &opts.refs {
        let selected = expand_ref_names(filter, &remotes);
        diff.add.retain(|c| selected.contains(&c.ref_name));
        diff.update.retain(|c| selected.contains(&c.ref_name));
    }
    diff.delete.clear();

    if !opts.dry_run && !diff.in_sync() {
        additive_fetch(repo_path, src, opts.refs.as_deref())?;
    }
    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scp_urls_rejected() {
        assert!(reject_scp("user@host:repo.git").is_err());
        assert!(reject_scp("host:repo.git").is_err());
        assert!(reject_scp("/abs/path").is_ok());
        assert!(reject_scp("./rel/path").is_ok());
        assert!(reject_scp("C:\\windows\\path").is_ok());
        assert!(reject_scp("ssh://host/repo.git").is_ok());
        assert!(reject_scp("file:///abs/path").is_ok());
    }

    #[test]
    fn bundle_detection() {
        assert!(is_bundle("backup.bundle"));
        assert!(is_bundle("BACKUP.BUNDLE"));
        assert!(!is_bundle("backup.tar"));
    }

    #[test]
    fn parse_header_skips_prerequisites_and_head() {
        let data = b"# v2 git bundle\n\
            -0123456789abcdef0123456789abcdef01234567 prereq\n\
            1111111111111111111111111111111111111111 refs/heads/main\n\
            2222222222222222222222222222222222222222 HEAD\n\
            \nPACKDATA";
        let (refs, offset) = parse_bundle_header(data).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(
            refs["refs/heads/main"],
            "1111111111111111111111111111111111111111"
        );
        assert_eq!(&data[offset..], b"PACKDATA");
    }

    #[test]
    fn parse_header_rejects_garbage() {
        assert!(parse_bundle_header(b"not a bundle").is_err());
    }
}
