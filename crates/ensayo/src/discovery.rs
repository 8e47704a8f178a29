//! Test file discovery.

use crate::result::{EnsayoError, EnsayoResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Patterns a session resolves: the override alone, or every default
#[must_use]
pub fn effective_patterns(files: Option<&str>, defaults: &[String]) -> Vec<String> {
    match files {
        Some(pattern) => vec![pattern.to_string()],
        None => defaults.to_vec(),
    }
}

/// Resolve test files under `root`.
///
/// Each pattern is expanded on its own and relative patterns are taken from
/// `root`. Only regular files are kept. Results keep pattern order (sorted
/// within a pattern) and a file matched by two patterns appears once.
pub fn resolve_test_files(
    root: &Path,
    files: Option<&str>,
    defaults: &[String],
) -> EnsayoResult<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for pattern in effective_patterns(files, defaults) {
        let matches = expand_pattern(root, &pattern)?;
        tracing::debug!(pattern, count = matches.len(), "expanded pattern");
        for path in matches {
            if seen.insert(path.clone()) {
                resolved.push(path);
            }
        }
    }

    Ok(resolved)
}

/// Expand one glob pattern relative to `root`
pub fn expand_pattern(root: &Path, pattern: &str) -> EnsayoResult<Vec<PathBuf>> {
    let full = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        // the root is a literal path, only the pattern may hold wildcards
        let root = glob::Pattern::escape(&root.to_string_lossy());
        Path::new(&root).join(pattern).to_string_lossy().into_owned()
    };

    let entries = glob::glob(&full).map_err(|e| EnsayoError::Discovery {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable path");
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Whether `path` (absolute or relative to `root`) matches any pattern
#[must_use]
pub fn matches_any(root: &Path, path: &Path, patterns: &[glob::Pattern]) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    patterns
        .iter()
        .any(|p| p.matches_path_with(relative, options) || p.matches_path_with(path, options))
}

/// Compile glob patterns, reporting the first invalid one
pub fn compile_patterns(patterns: &[String]) -> EnsayoResult<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| EnsayoError::Discovery {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("tests/e2e/auth")).unwrap();
        fs::create_dir_all(root.join("tests/smoke")).unwrap();
        fs::write(root.join("tests/e2e/home.e2e.yaml"), "tests: []").unwrap();
        fs::write(root.join("tests/e2e/auth/login.e2e.yaml"), "tests: []").unwrap();
        fs::write(root.join("tests/e2e/auth/only-this.e2e.yaml"), "tests: []").unwrap();
        fs::write(root.join("tests/smoke/boot.e2e.yaml"), "tests: []").unwrap();
        fs::write(root.join("tests/e2e/notes.md"), "").unwrap();
        dir
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_override_replaces_defaults() {
        let dir = tree();
        let defaults = vec!["tests/**/*.e2e.yaml".to_string()];
        let files = resolve_test_files(dir.path(), Some("**/only-this.*"), &defaults).unwrap();
        assert_eq!(names(&files), vec!["only-this.e2e.yaml"]);
    }

    #[test]
    fn test_each_default_expanded() {
        let dir = tree();
        let defaults = vec![
            "tests/smoke/*.e2e.yaml".to_string(),
            "tests/e2e/*.e2e.yaml".to_string(),
        ];
        let files = resolve_test_files(dir.path(), None, &defaults).unwrap();
        assert_eq!(names(&files), vec!["boot.e2e.yaml", "home.e2e.yaml"]);
    }

    #[test]
    fn test_overlapping_patterns_dedupe() {
        let dir = tree();
        let defaults = vec![
            "tests/e2e/auth/*.e2e.yaml".to_string(),
            "tests/e2e/**/*.e2e.yaml".to_string(),
        ];
        let files = resolve_test_files(dir.path(), None, &defaults).unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(names(&files)[..2], ["login.e2e.yaml", "only-this.e2e.yaml"]);
    }

    #[test]
    fn test_no_matches_is_empty() {
        let dir = tree();
        let files = resolve_test_files(dir.path(), Some("nothing/*.yaml"), &[]).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_invalid_pattern() {
        let dir = tree();
        let err = resolve_test_files(dir.path(), Some("tests/[.yaml"), &[]).unwrap_err();
        assert!(matches!(err, EnsayoError::Discovery { .. }));
    }

    #[test]
    fn test_root_with_glob_characters() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("site[v2]");
        fs::create_dir_all(root.join("tests/e2e")).unwrap();
        fs::write(root.join("tests/e2e/home.e2e.yaml"), "tests: []").unwrap();

        let defaults = vec!["tests/e2e/*.e2e.yaml".to_string()];
        let files = resolve_test_files(&root, None, &defaults).unwrap();
        assert_eq!(names(&files), vec!["home.e2e.yaml"]);
        assert!(files[0].starts_with(&root));
    }

    #[test]
    fn test_effective_patterns() {
        let defaults = vec!["a/*".to_string(), "b/*".to_string()];
        assert_eq!(effective_patterns(Some("c/*"), &defaults), vec!["c/*"]);
        assert_eq!(effective_patterns(None, &defaults), defaults);
    }

    #[test]
    fn test_matches_any() {
        let root = Path::new("/p");
        let patterns = compile_patterns(&["tests/**/*.e2e.yaml".to_string()]).unwrap();
        assert!(matches_any(root, Path::new("/p/tests/e2e/a.e2e.yaml"), &patterns));
        assert!(!matches_any(root, Path::new("/p/src/a.ts"), &patterns));
    }
}
