//! Architectural Enforcement Support
//!
//! Source scanning helpers shared by the rule tests in `tests/`:
//! - No blocking I/O inside async functions
//! - No sleeping in production code
//! - No `unwrap()`/`expect()` in the core library
//!
//! The scanner is line-based. It understands enough Rust to find the
//! enclosing function of a line and the `#[cfg(test)]` module at the bottom of
//! a file; it does not parse.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Root of the workspace this crate lives in
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Source directory of the core library
#[must_use]
pub fn core_src() -> PathBuf {
    workspace_root().join("connect").join("core").join("src")
}

/// Source directory of the command-line client
#[must_use]
pub fn cli_src() -> PathBuf {
    workspace_root().join("connect").join("cli").join("src")
}

/// A Rust source file read into lines
#[derive(Debug)]
pub struct SourceFile {
    /// Path the file was read from
    pub path: PathBuf,
    /// File contents split into lines
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Wrap in-memory lines (used to test the scanner itself)
    pub fn from_lines(path: impl Into<PathBuf>, lines: &[&str]) -> Self {
        Self {
            path: path.into(),
            lines: lines.iter().map(|l| (*l).to_string()).collect(),
        }
    }

    /// Index of the first line of the trailing test module, if any
    #[must_use]
    pub fn test_region_start(&self) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.trim_start().starts_with("#[cfg(test)]"))
    }

    /// Lines outside the test module, with their indices
    pub fn production_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        let end = self.test_region_start().unwrap_or(self.lines.len());
        self.lines[..end]
            .iter()
            .enumerate()
            .map(|(idx, line)| (idx, line.as_str()))
    }

    /// Kind of the function enclosing line `idx`
    ///
    /// Scans upwards to the nearest `fn` signature. Returns `None` at module
    /// or `impl` level.
    #[must_use]
    pub fn enclosing_fn(&self, idx: usize) -> Option<FnKind> {
        let end = (idx + 1).min(self.lines.len());
        for line in self.lines[..end].iter().rev() {
            if let Some(kind) = fn_kind(line) {
                return Some(kind);
            }
            let trimmed = line.trim_start();
            if trimmed.starts_with("mod ") || (trimmed.starts_with("impl") && trimmed.contains('{'))
            {
                return None;
            }
        }
        None
    }

    /// Build a violation for line `idx`
    #[must_use]
    pub fn violation(&self, idx: usize, rule: &'static str) -> Violation {
        Violation {
            path: self.path.clone(),
            line: idx + 1,
            rule,
            text: self.lines[idx].trim().to_string(),
        }
    }
}

/// Whether a function is `async`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnKind {
    /// `async fn`
    Async,
    /// Plain `fn`
    Sync,
}

/// Classify a line as a function signature
///
/// Accepts visibility and `const`/`async`/`unsafe` qualifiers before `fn`.
#[must_use]
pub fn fn_kind(line: &str) -> Option<FnKind> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("//") {
        return None;
    }

    let mut is_async = false;
    for token in trimmed.split_whitespace() {
        match token {
            "fn" => {
                return Some(if is_async { FnKind::Async } else { FnKind::Sync });
            }
            "async" => is_async = true,
            "const" | "unsafe" | "default" => {}
            vis if vis.starts_with("pub") => {}
            _ => return None,
        }
    }
    None
}

/// Code part of a line: everything before a `//` comment
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Read every `.rs` file below `dir`
#[must_use]
pub fn rust_sources(dir: &Path) -> Vec<SourceFile> {
    let mut files: Vec<SourceFile> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .filter_map(|entry| {
            let content = fs::read_to_string(entry.path()).ok()?;
            Some(SourceFile {
                path: entry.path().to_path_buf(),
                lines: content.lines().map(str::to_string).collect(),
            })
        })
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

/// One rule violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the violation
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Short rule description
    pub rule: &'static str,
    /// Offending line, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.rule,
            self.text
        )
    }
}

/// Print violations and fail the calling test
///
/// # Panics
///
/// Panics when `violations` is not empty.
pub fn report(title: &str, violations: &[Violation], advice: &[&str]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!();
    for line in advice {
        eprintln!("  {line}");
    }

    panic!(
        "\nFound {} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_kind() {
        assert_eq!(fn_kind("async fn run() {"), Some(FnKind::Async));
        assert_eq!(
            fn_kind("    pub(crate) async fn send(&self) -> X {"),
            Some(FnKind::Async)
        );
        assert_eq!(fn_kind("pub fn load_config() -> Result<()> {"), Some(FnKind::Sync));
        assert_eq!(fn_kind("    const fn limit() -> usize {"), Some(FnKind::Sync));
        assert_eq!(fn_kind("// fn commented() {"), None);
        assert_eq!(fn_kind("let f: Box<dyn Fn(&str)> = x;"), None);
        assert_eq!(fn_kind("    lookup: impl Fn(&str) -> Option<String>,"), None);
    }

    #[test]
    fn test_enclosing_fn() {
        let file = SourceFile::from_lines(
            "x.rs",
            &[
                "use std::fs;",
                "pub fn load() {",
                "    let s = std::fs::read_to_string(p);",
                "}",
                "impl Session {",
                "    pub async fn send(&self) {",
                "        let s = std::fs::read_to_string(p);",
                "    }",
                "}",
            ],
        );

        assert_eq!(file.enclosing_fn(0), None);
        assert_eq!(file.enclosing_fn(2), Some(FnKind::Sync));
        assert_eq!(file.enclosing_fn(6), Some(FnKind::Async));
    }

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let file = SourceFile::from_lines(
            "x.rs",
            &["fn a() {}", "#[cfg(test)]", "mod tests {", "    fn b() {}", "}"],
        );

        let lines: Vec<usize> = file.production_lines().map(|(idx, _)| idx).collect();
        assert_eq!(lines, vec![0]);
    }

    #[test]
    fn test_code_part_drops_comment() {
        assert_eq!(code_part("let x = 1; // .unwrap()"), "let x = 1; ");
    }

    #[test]
    fn test_source_dirs_exist() {
        assert!(core_src().join("lib.rs").exists());
        assert!(cli_src().join("main.rs").exists());
    }
}
