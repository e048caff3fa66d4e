//! Source scanning helpers shared by the architectural enforcement tests.
//!
//! Each test walks the production sources of the router crates and reports
//! lines that break an async-efficiency rule. Inline `#[cfg(test)] mod`
//! blocks and test-only modules are stripped before scanning.

use std::fs;
use std::path::{Path, PathBuf};

/// Crate source directories under scrutiny, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["router/core/src", "router/cli/src"];

/// Files compiled only under `cfg(test)`
const TEST_ONLY_FILES: &[&str] = &["test_utils.rs"];

/// A production source file with its test modules removed
#[derive(Debug)]
pub struct SourceFile {
    /// Path of the file on disk
    pub path: PathBuf,
    /// Production lines, in order, starting at line 1
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Whether the path ends with the given relative suffix
    pub fn is(&self, suffix: &str) -> bool {
        self.path.ends_with(suffix)
    }

    /// Format a violation for the given zero-based line index
    pub fn violation(&self, idx: usize, what: &str) -> String {
        format!(
            "{}:{} - {}: {}",
            self.path.display(),
            idx + 1,
            what,
            self.lines[idx].trim()
        )
    }
}

/// Workspace root, two levels above this crate
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Load every production `.rs` file of the router crates
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }

        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let file = entry.path();
            if file.extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let name = file.file_name().and_then(|s| s.to_str()).unwrap_or("");
            if TEST_ONLY_FILES.contains(&name) {
                continue;
            }
            let Ok(content) = fs::read_to_string(file) else {
                continue;
            };
            files.push(SourceFile {
                path: file.to_path_buf(),
                lines: strip_test_modules(&content),
            });
        }
    }

    files
}

/// Drop everything from the first inline `#[cfg(test)] mod name {` onwards
pub fn strip_test_modules(content: &str) -> Vec<String> {
    let lines: Vec<&str> = content.lines().collect();
    let mut kept = Vec::with_capacity(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        if line.trim() == "#[cfg(test)]" {
            let next = lines.get(idx + 1).map_or("", |l| l.trim());
            if next.starts_with("mod ") && next.ends_with('{') {
                break;
            }
        }
        kept.push((*line).to_string());
    }

    kept
}

/// The code portion of a line, without a trailing `//` comment
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Whether the enclosing function of `current_idx` is `async`
pub fn is_in_async_function(lines: &[String], current_idx: usize) -> bool {
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();

        if line.contains("async fn ") || line.contains("async move") {
            return true;
        }

        if is_fn_start(line) {
            return false;
        }

        if line.starts_with("mod ") || (line.starts_with("impl") && line.ends_with('{')) {
            return false;
        }
    }
    false
}

fn is_fn_start(line: &str) -> bool {
    line.starts_with("fn ")
        || line.starts_with("pub fn ")
        || line.starts_with("pub(crate) fn ")
        || line.starts_with("const fn ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| (*l).to_string()).collect()
    }

    #[test]
    fn test_strip_test_modules() {
        let content = "fn a() {}\n\n#[cfg(test)]\nmod tests {\n    fn b() {}\n}\n";
        let lines = strip_test_modules(content);
        assert_eq!(lines, vec!["fn a() {}".to_string(), String::new()]);
    }

    #[test]
    fn test_cfg_test_module_declaration_is_kept() {
        let content = "#[cfg(test)]\npub(crate) mod test_utils;\npub use a::B;\n";
        assert_eq!(strip_test_modules(content).len(), 3);
    }

    #[test]
    fn test_async_function_detection() {
        let code = owned(&[
            "pub async fn load() {",
            "    let contents = std::fs::read_to_string(\"file.txt\")?;",
            "}",
        ]);
        assert!(is_in_async_function(&code, 1));

        let code = owned(&[
            "pub fn load() {",
            "    let contents = std::fs::read_to_string(\"config.toml\")?;",
            "}",
        ]);
        assert!(!is_in_async_function(&code, 1));
    }

    #[test]
    fn test_sources_are_found() {
        let files = production_sources();
        assert!(
            files.iter().any(|f| f.is("routing/router.rs")),
            "router sources should be scanned"
        );
        assert!(!files.iter().any(|f| f.is("routing/test_utils.rs")));
    }
}
