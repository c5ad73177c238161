//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code waits on I/O, channels, or cancellation tokens.
//! It never sleeps to poll or to paper over ordering.
//! **Exceptions**: test code.

use architectural_enforcement::{
    cli_src, code_part, core_src, report, rust_sources, SourceFile, Violation,
};

const SLEEP_PATTERNS: &[&str] = &["thread::sleep", "time::sleep", "sleep_until"];

/// Test that production code does not contain sleep calls
#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();
    for dir in [core_src(), cli_src()] {
        for file in rust_sources(&dir) {
            violations.extend(sleep_violations(&file));
        }
    }

    report(
        "CRITICAL: Sleep calls found in production code!",
        &violations,
        &[
            "❌ FORBIDDEN:",
            "  - Sleep in polling loops",
            "  - Sleep as poor man's synchronization",
            "✅ USE INSTEAD:",
            "  - tokio::select! on the stream and a CancellationToken",
            "  - mpsc/oneshot channels to wait for events",
        ],
    );
}

fn sleep_violations(file: &SourceFile) -> Vec<Violation> {
    file.production_lines()
        .filter(|(_, line)| {
            let code = code_part(line);
            SLEEP_PATTERNS.iter().any(|pattern| code.contains(pattern))
        })
        .map(|(idx, _)| file.violation(idx, "Sleep call"))
        .collect()
}

#[test]
fn test_detects_sleep_outside_tests() {
    let file = SourceFile::from_lines(
        "poll.rs",
        &[
            "async fn poll() {",
            "    tokio::time::sleep(Duration::from_millis(10)).await;",
            "    // tokio::time::sleep in a comment is fine",
            "}",
            "#[cfg(test)]",
            "mod tests {",
            "    async fn wait() { tokio::time::sleep(d).await; }",
            "}",
        ],
    );

    let violations = sleep_violations(&file);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].line, 2);
}
