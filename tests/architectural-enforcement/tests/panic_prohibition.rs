//! Integration Test: Panic Prohibition in the Core Library
//!
//! **Policy**: `connect-core` reports failures through its error types or the
//! fallback reply. Production code MUST NOT call `.unwrap()` or `.expect(`.
//! **Exceptions**: the `#[cfg(test)]` module of each file, doc comments.
//!
//! The CLI is not covered; `anyhow` already turns its errors into an exit
//! status.

use architectural_enforcement::{code_part, core_src, report, rust_sources, SourceFile, Violation};

/// Test that the core library never unwraps in production code
#[test]
fn test_no_unwrap_in_core_library() {
    let violations: Vec<Violation> = rust_sources(&core_src())
        .iter()
        .flat_map(panic_violations)
        .collect();

    report(
        "CRITICAL: unwrap()/expect() found in connect-core!",
        &violations,
        &[
            "✅ USE INSTEAD:",
            "  - `?` with a thiserror variant (ConfigError, TransportError)",
            "  - unwrap_or / unwrap_or_default / unwrap_or_else",
            "  - let-else with a logged early return",
        ],
    );
}

fn panic_violations(file: &SourceFile) -> Vec<Violation> {
    file.production_lines()
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .filter_map(|(idx, line)| {
            let code = code_part(line);
            if code.contains(".unwrap()") {
                Some(file.violation(idx, "unwrap() in production code"))
            } else if code.contains(".expect(") {
                Some(file.violation(idx, "expect() in production code"))
            } else {
                None
            }
        })
        .collect()
}

#[test]
fn test_detects_unwrap_and_expect() {
    let file = SourceFile::from_lines(
        "bad.rs",
        &[
            "fn parse(s: &str) -> u64 {",
            "    let n = s.parse::<u64>().unwrap();",
            "    let m = s.parse::<u64>().expect(\"number\");",
            "    let k = s.parse::<u64>().unwrap_or(0);",
            "    //! let d = x.unwrap();",
            "    n + m + k",
            "}",
        ],
    );

    let lines: Vec<usize> = panic_violations(&file).iter().map(|v| v.line).collect();
    assert_eq!(lines, vec![2, 3]);
}

#[test]
fn test_ignores_test_module() {
    let file = SourceFile::from_lines(
        "ok.rs",
        &[
            "pub fn ok() {}",
            "#[cfg(test)]",
            "mod tests {",
            "    fn t() { Some(1).unwrap(); }",
            "}",
        ],
    );

    assert!(panic_violations(&file).is_empty());
}
