//! Architectural Enforcement Integration Tests
//!
//! This package contains tests that enforce architectural principles of the
//! conductor crates:
//! - No blocking sleeps in production code
//! - No blocking HTTP clients inside the async runtime
//! - No nested runtimes (`block_on`)
//!
//! Test modules (`#[cfg(test)]` blocks and `tests/` directories) are exempt.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// A forbidden pattern found in production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the pattern
    pub file: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The forbidden pattern that matched
    pub pattern: &'static str,
}

/// Patterns that must not appear outside test code
pub const FORBIDDEN_PATTERNS: &[&str] = &[
    "thread::sleep",
    "reqwest::blocking",
    "block_on(",
];

/// Source roots checked by the enforcement tests, relative to the workspace root
pub const PRODUCTION_ROOTS: &[&str] = &["conductor/core/src", "conductor/cli/src"];

/// Workspace root (two levels above this crate)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Production part of a source file: everything before the first `#[cfg(test)]`
#[must_use]
pub fn production_section(source: &str) -> &str {
    source
        .find("#[cfg(test)]")
        .map_or(source, |idx| &source[..idx])
}

/// Find forbidden patterns in one file's source text
#[must_use]
pub fn scan_source(file: &Path, source: &str) -> Vec<Violation> {
    production_section(source)
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim_start();
            !trimmed.starts_with("//")
        })
        .flat_map(|(idx, line)| {
            FORBIDDEN_PATTERNS
                .iter()
                .copied()
                .filter(move |pattern| line.contains(pattern))
                .map(move |pattern| Violation {
                    file: file.to_path_buf(),
                    line: idx + 1,
                    pattern,
                })
        })
        .collect()
}

/// Scan every `.rs` file under `root`
#[must_use]
pub fn scan_tree(root: &Path) -> Vec<Violation> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "rs"))
        .filter_map(|entry| {
            fs::read_to_string(entry.path())
                .ok()
                .map(|source| scan_source(entry.path(), &source))
        })
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_code_has_no_blocking_calls() {
        let root = workspace_root();
        let mut violations = Vec::new();
        for dir in PRODUCTION_ROOTS {
            let path = root.join(dir);
            assert!(path.is_dir(), "missing source root {}", path.display());
            violations.extend(scan_tree(&path));
        }

        assert!(
            violations.is_empty(),
            "blocking calls in production code:\n{}",
            violations
                .iter()
                .map(|v| format!("  {}:{} `{}`", v.file.display(), v.line, v.pattern))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    #[test]
    fn test_scan_flags_sleep() {
        let source = "fn wait() {\n    std::thread::sleep(d);\n}\n";
        let found = scan_source(Path::new("x.rs"), source);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 2);
        assert_eq!(found[0].pattern, "thread::sleep");
    }

    #[test]
    fn test_scan_ignores_tests_and_comments() {
        let source = "// thread::sleep is forbidden\nfn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() { std::thread::sleep(d); }\n}\n";
        assert!(scan_source(Path::new("x.rs"), source).is_empty());
    }
}
