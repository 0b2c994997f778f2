//! Gitignore-style exclude predicate consumed by copy/sync.
//!
//! Supports `!` negation, a trailing `/` for directory-only patterns, and
//! anchoring: a pattern containing `/` matches against the full relative
//! path, any other pattern against the basename. The last matching rule
//! wins, so negations placed after positive patterns re-include paths.

use std::fs;
use std::path::Path;

use crate::glob::fnmatch;
use crate::Result;

#[derive(Debug, Clone)]
struct Rule {
    /// Pattern with `!` and trailing `/` stripped.
    pattern: String,
    negated: bool,
    dir_only: bool,
}

/// Gitignore-style exclusion filter.
///
/// Matching uses plain fnmatch, without the dotfile protection of
/// [`glob_match`](crate::glob::glob_match): `*.pyc` excludes `.hidden.pyc`.
///
/// # Example
///
/// ```rust
/// use vost::ExcludeFilter;
///
/// let mut f = ExcludeFilter::new();
/// f.add_patterns(&["*.log", "!keep.log"]);
/// assert!(f.is_excluded("debug.log", false));
/// assert!(!f.is_excluded("keep.log", false));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    rules: Vec<Rule>,
}

impl ExcludeFilter {
    /// An empty filter that excludes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a filter from inline patterns and/or a pattern file. A missing
    /// file is not an error.
    pub fn with_options(patterns: Option<&[&str]>, exclude_from: Option<&Path>) -> Result<Self> {
        let mut filter = Self::new();
        if let Some(pats) = patterns {
            filter.add_patterns(pats);
        }
        if let Some(path) = exclude_from {
            filter.load_from_file(path)?;
        }
        Ok(filter)
    }

    /// Add patterns, skipping blank lines and `#` comments. Leading `!` and
    /// trailing `/` are parsed and stripped before storage.
    pub fn add_patterns(&mut self, patterns: &[&str]) {
        for &raw in patterns {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (negated, line) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let (dir_only, line) = match line.strip_suffix('/') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            if line.is_empty() {
                continue;
            }

            self.rules.push(Rule {
                pattern: line.to_string(),
                negated,
                dir_only,
            });
        }
    }

    /// Load patterns from a file, one per line. Returns `Ok(())` silently if
    /// the file does not exist.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let contents = fs::read_to_string(path)?;
        let lines: Vec<&str> = contents.lines().map(|l| l.trim_end()).collect();
        self.add_patterns(&lines);
        Ok(())
    }

    /// Whether `rel_path` (forward-slash relative) should be excluded.
    /// Directory-only rules are skipped when `is_dir` is false.
    pub fn is_excluded(&self, rel_path: &str, is_dir: bool) -> bool {
        let mut excluded = false;
        for rule in &self.rules {
            if rule.dir_only && !is_dir {
                continue;
            }
            if rule_matches(&rule.pattern, rel_path) {
                excluded = !rule.negated;
            }
        }
        excluded
    }

    /// `true` once at least one pattern is loaded.
    pub fn active(&self) -> bool {
        !self.rules.is_empty()
    }
}

fn rule_matches(pattern: &str, path: &str) -> bool {
    if pattern.contains('/') {
        fnmatch(pattern.as_bytes(), path.as_bytes())
    } else {
        let base = path.rsplit('/').next().unwrap_or(path);
        fnmatch(pattern.as_bytes(), base.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_filter_excludes_nothing() {
        let f = ExcludeFilter::new();
        assert!(!f.active());
        assert!(!f.is_excluded("anything", false));
    }

    #[test]
    fn wildcard_on_basename() {
        let mut f = ExcludeFilter::new();
        f.add_patterns(&["*.log"]);
        assert!(f.is_excluded("debug.log", false));
        assert!(f.is_excluded("deep/dir/error.log", false));
        assert!(!f.is_excluded("main.rs", false));
    }

    #[test]
    fn anchored_pattern_matches_full_path() {
        let mut f = ExcludeFilter::new();
        f.add_patterns(&["gen/*.rs"]);
        assert!(f.is_excluded("gen/out.rs", false));
        assert!(!f.is_excluded("src/gen/out.rs", false));
    }

    #[test]
    fn dir_only_pattern() {
        let mut f = ExcludeFilter::new();
        f.add_patterns(&["target/"]);
        assert!(f.is_excluded("target", true));
        assert!(!f.is_excluded("target", false));
    }

    #[test]
    fn negation_last_match_wins() {
        let mut f = ExcludeFilter::new();
        f.add_patterns(&["*.log", "!keep.log"]);
        assert!(f.is_excluded("a.log", false));
        assert!(!f.is_excluded("keep.log", false));

        f.add_patterns(&["keep.log"]);
        assert!(f.is_excluded("keep.log", false));
    }

    #[test]
    fn comments_and_blanks_ignored() {
        let mut f = ExcludeFilter::new();
        f.add_patterns(&["", "   ", "# comment", "*.o"]);
        assert!(f.active());
        assert!(f.is_excluded("a.o", false));
        assert!(!f.is_excluded("# comment", false));
    }

    #[test]
    fn no_dotfile_protection() {
        let mut f = ExcludeFilter::new();
        f.add_patterns(&["*.pyc"]);
        assert!(f.is_excluded(".cache.pyc", false));
    }

    #[test]
    fn load_missing_file_is_ok() {
        let mut f = ExcludeFilter::new();
        assert!(f
            .load_from_file(Path::new("/no/such/ignore-file"))
            .is_ok());
        assert!(!f.active());
    }

    #[test]
    fn load_from_file() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "# generated artifacts").unwrap();
        writeln!(tmp, "*.log").unwrap();
        writeln!(tmp, "!keep.log").unwrap();
        writeln!(tmp, "build/").unwrap();
        tmp.flush().unwrap();

        let f = ExcludeFilter::with_options(None, Some(tmp.path())).unwrap();
        assert!(f.is_excluded("x.log", false));
        assert!(!f.is_excluded("keep.log", false));
        assert!(f.is_excluded("build", true));
        assert!(!f.is_excluded("build", false));
    }
}
