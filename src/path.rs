//! Canonical path handling, ref-name validation, and hash validation.
//!
//! Store paths are forward-slash-delimited and relative; the empty string is
//! the tree root and is accepted only by the operations that document it.

use crate::error::{Error, Result};

/// Normalize a store path to its canonical form.
///
/// Strips leading/trailing slashes and collapses `.` segments. Rejects
/// `..` segments and interior empty segments (`"a//b"`). A path that is
/// empty or consists only of slashes normalizes to `""` (the root); a
/// path whose content collapses away entirely (e.g. `"."`) is an error.
///
/// # Errors
/// [`Error::InvalidPath`] on `..` segments, interior double slashes, or
/// paths that collapse to nothing without being root.
pub fn normalize(path: &str) -> Result<String> {
    // Leading and trailing slash runs are tolerated; anything left empty
    // after that is an interior `//`.
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    let mut parts: Vec<&str> = Vec::new();
    for seg in trimmed.split('/') {
        match seg {
            "" => {
                return Err(Error::invalid_path(format!(
                    "empty segment (interior '//') in {:?}",
                    path
                )))
            }
            "." => continue,
            ".." => {
                return Err(Error::invalid_path(format!(
                    "'..' segment not allowed in {:?}",
                    path
                )))
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Err(Error::invalid_path(format!(
            "path {:?} collapses to nothing",
            path
        )));
    }

    Ok(parts.join("/"))
}

/// Whether `path` denotes the tree root (empty or slashes only).
pub fn is_root(path: &str) -> bool {
    path.bytes().all(|b| b == b'/')
}

/// The final segment of a normalized path.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Join a normalized prefix and a relative path, treating an empty prefix
/// as the root.
pub fn join(prefix: &str, rest: &str) -> String {
    if prefix.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix, rest)
    }
}

/// Validate a reference name (without or with a `refs/` prefix).
///
/// Follows git's `check-ref-format` rules for the characters vost can
/// produce: rejects whitespace, control characters, `:`, `\`, `^`, `~`,
/// `?`, `*`, `[`, the sequences `..` and `@{`, leading or trailing `/`,
/// and names ending in `.`, `.lock`, or `/`.
///
/// # Errors
/// [`Error::InvalidRefName`] describing the violated rule.
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_ref_name("ref name must not be empty"));
    }

    for ch in name.chars() {
        if ch.is_control() {
            return Err(Error::invalid_ref_name(
                "ref name must not contain control characters",
            ));
        }
        if matches!(ch, ':' | ' ' | '\t' | '\\' | '^' | '~' | '?' | '*' | '[') {
            return Err(Error::invalid_ref_name(format!(
                "ref name contains invalid character {:?}",
                ch
            )));
        }
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err(Error::invalid_ref_name(
            "ref name must not start or end with '/'",
        ));
    }
    if name.contains("..") {
        return Err(Error::invalid_ref_name("ref name must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(Error::invalid_ref_name("ref name must not contain '@{'"));
    }
    if name.ends_with('.') {
        return Err(Error::invalid_ref_name("ref name must not end with '.'"));
    }
    if name.ends_with(".lock") {
        return Err(Error::invalid_ref_name(
            "ref name must not end with '.lock'",
        ));
    }

    Ok(())
}

/// Validate a 40-character lowercase hex object id.
///
/// # Errors
/// [`Error::InvalidHash`] unless `s` is exactly 40 chars of `[0-9a-f]`.
pub fn validate_hex_oid(s: &str) -> Result<()> {
    if is_hex_oid(s) {
        Ok(())
    } else {
        Err(Error::invalid_hash(s))
    }
}

/// `true` when `s` is a well-formed 40-char lowercase hex object id.
pub fn is_hex_oid(s: &str) -> bool {
    s.len() == 40
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
