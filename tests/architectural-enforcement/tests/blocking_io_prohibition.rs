//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async functions in the core library and the CLI MUST NOT block
//! the runtime thread.
//! **Required**: `tokio::io`, `tokio::net`, `tokio::fs`, async `reqwest`.
//!
//! Blocking calls are acceptable in plain `fn`s (configuration loading runs
//! before the first exchange) and in test code.

use architectural_enforcement::{
    cli_src, code_part, core_src, report, rust_sources, FnKind, SourceFile, Violation,
};

const BLOCKING_PATTERNS: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
    ("std::io::stdin()", "Blocking stdin"),
    ("std::io::stdout()", "Blocking stdout"),
    ("std::thread::sleep", "Blocking sleep"),
];

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();
    for dir in [core_src(), cli_src()] {
        for file in rust_sources(&dir) {
            violations.extend(blocking_io_violations(&file));
        }
    }

    report(
        "CRITICAL: Blocking I/O calls found in async code!",
        &violations,
        &[
            "✅ REQUIRED async I/O:",
            "  - tokio::io::stdin(), tokio::io::stdout() with AsyncBufReadExt/AsyncWriteExt",
            "  - tokio::net::TcpStream, reqwest::Client",
            "✅ ACCEPTABLE blocking I/O:",
            "  - Non-async functions (config loading before the first exchange)",
            "  - Test code",
        ],
    );
}

fn blocking_io_violations(file: &SourceFile) -> Vec<Violation> {
    file.production_lines()
        .filter(|(idx, _)| file.enclosing_fn(*idx) == Some(FnKind::Async))
        .flat_map(|(idx, line)| {
            let code = code_part(line);
            BLOCKING_PATTERNS
                .iter()
                .filter(move |(pattern, _)| code.contains(pattern))
                .map(move |&(_, rule)| file.violation(idx, rule))
        })
        .collect()
}

#[test]
fn test_detects_blocking_read_in_async_fn() {
    let file = SourceFile::from_lines(
        "bad.rs",
        &[
            "pub async fn load() {",
            "    let s = std::fs::read_to_string(\"config.toml\");",
            "}",
        ],
    );

    let violations = blocking_io_violations(&file);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].line, 2);
    assert_eq!(violations[0].rule, "Blocking file I/O");
}

#[test]
fn test_allows_blocking_read_in_sync_fn_and_tests() {
    let file = SourceFile::from_lines(
        "ok.rs",
        &[
            "pub fn load() {",
            "    let s = std::fs::read_to_string(\"config.toml\");",
            "}",
            "#[cfg(test)]",
            "mod tests {",
            "    #[tokio::test]",
            "    async fn test_it() {",
            "        let s = std::fs::read_to_string(\"fixture\");",
            "    }",
            "}",
        ],
    );

    assert!(blocking_io_violations(&file).is_empty());
}
