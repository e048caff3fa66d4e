//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in the router crates MUST NOT use blocking I/O.
//! **Required**: `tokio::io`, `tokio::net` and async `reqwest`, not `std::fs`,
//! `std::net`, blocking stdio or `reqwest::blocking`.
//!
//! Synchronous functions (configuration loading before the runtime does any
//! routing) may read files.

use architectural_enforcement::{code_part, is_in_async_function, production_sources, SourceFile};

#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in async code!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n❌ FORBIDDEN in async functions:");
        eprintln!("  - std::fs::*, std::net::*");
        eprintln!("  - std::io::stdin(), std::io::stdout()");
        eprintln!("  - std::process::Command");
        eprintln!("  - reqwest::blocking::* (anywhere)");
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::io::stdout() with AsyncWriteExt");
        eprintln!("  - reqwest::Client with .await");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}

fn find_blocking_io_violations() -> Vec<String> {
    let mut violations = Vec::new();
    for file in production_sources() {
        check_file(&file, &mut violations);
    }
    violations
}

fn check_file(file: &SourceFile, violations: &mut Vec<String>) {
    for (idx, line) in file.lines.iter().enumerate() {
        let code = code_part(line);

        if code.contains("reqwest::blocking") {
            violations.push(file.violation(idx, "Blocking HTTP client"));
            continue;
        }

        if code.trim_start().starts_with("use std::net") {
            violations.push(file.violation(idx, "Blocking network import"));
            continue;
        }

        if !is_in_async_function(&file.lines, idx) {
            continue;
        }

        if code.contains("std::fs::") {
            violations.push(file.violation(idx, "Blocking file I/O"));
        }
        if code.contains("std::net::") {
            violations.push(file.violation(idx, "Blocking network I/O"));
        }
        if code.contains("std::process::Command") {
            violations.push(file.violation(idx, "Blocking process I/O"));
        }
        if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
            violations.push(file.violation(idx, "Blocking stdin/stdout in async"));
        }
    }
}
