//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the router crates MUST NOT sleep to wait
//! for events. Waiting happens on channels, cancellation tokens and I/O.
//! **Exceptions**: retry backoff, and `sleep_until` racing a deadline inside
//! a `select!`.

use architectural_enforcement::{code_part, production_sources, SourceFile};

/// Files whose sleeps implement backoff between attempts
const BACKOFF_FILES: &[&str] = &["routing/retry.rs"];

#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - Backoff between retry attempts (routing/retry.rs)");
        eprintln!("  - tokio::time::sleep_until as one arm of tokio::select!");
        eprintln!("  - Test code");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}

fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();
    for file in production_sources() {
        check_file(&file, &mut violations);
    }
    violations
}

fn check_file(file: &SourceFile, violations: &mut Vec<String>) {
    let backoff_allowed = BACKOFF_FILES.iter().any(|f| file.is(f));

    for (idx, line) in file.lines.iter().enumerate() {
        let code = code_part(line);

        if code.contains("::sleep(") || code.contains(".sleep(") {
            if backoff_allowed {
                continue;
            }
            violations.push(file.violation(idx, "sleep"));
        }

        if code.contains("sleep_until(") && !is_select_arm(&file.lines, idx) {
            violations.push(file.violation(idx, "sleep_until outside select!"));
        }
    }
}

/// Whether the line sits inside a `select!` block
fn is_select_arm(lines: &[String], current_idx: usize) -> bool {
    let start = current_idx.saturating_sub(10);
    lines[start..current_idx]
        .iter()
        .any(|l| code_part(l).contains("select!"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_arm_detection() {
        let code: Vec<String> = [
            "let event = tokio::select! {",
            "    biased;",
            "    () = tokio::time::sleep_until(deadline) => Event::Deadline,",
            "};",
        ]
        .iter()
        .map(|l| (*l).to_string())
        .collect();

        assert!(is_select_arm(&code, 2));
        assert!(!is_select_arm(&code, 0));
    }
}
