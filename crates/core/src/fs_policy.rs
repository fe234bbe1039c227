//! Sandbox path policy.
//!
//! Every path crossing the sandbox boundary is relative, `/`-delimited and
//! never begins with `/`. These helpers normalize user input into that form
//! and reject paths that would escape the sandbox root.

use crate::{Error, Result};

/// Normalizes a path intended for use within the sandbox.
///
/// Strips `.` segments, resolves `..` against preceding segments and
/// collapses repeated separators. Absolute paths (Unix or Windows style) and
/// traversal above the root are rejected. The empty string denotes the root.
pub fn normalize_path(input_path: &str) -> Result<String> {
    if input_path.starts_with('/') || input_path.starts_with('\\') {
        return Err(Error::invalid_path(format!(
            "Absolute paths are not allowed in sandbox: {}",
            input_path
        )));
    }

    // Cross-platform check: reject Windows-style absolute paths on any OS
    if input_path.len() >= 2
        && input_path.as_bytes()[1] == b':'
        && input_path.as_bytes()[0].is_ascii_alphabetic()
    {
        return Err(Error::invalid_path(format!(
            "Absolute paths are not allowed in sandbox: {}",
            input_path
        )));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in input_path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::invalid_path(format!(
                        "Path traversal detected in path: {}",
                        input_path
                    )));
                }
            }
            other => segments.push(other),
        }
    }

    Ok(segments.join("/"))
}

/// Like [`normalize_path`] but rejects the root itself.
pub fn normalize_entry_path(input_path: &str) -> Result<String> {
    let normalized = normalize_path(input_path)?;
    if normalized.is_empty() {
        return Err(Error::invalid_path(format!(
            "Path must name an entry below the root: '{}'",
            input_path
        )));
    }
    Ok(normalized)
}

/// Joins a directory path and a child name. The empty directory is the root.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Parent directory of a normalized path; the root's children return `""`.
pub fn parent(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Final segment of a normalized path.
pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Whether `path` is `prefix` itself or lies below it.
pub fn is_within(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'/')
}

/// Every proper ancestor directory of `path`, shallowest first.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(idx, _)| &path[..idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert_eq!(normalize_path("main.ts").unwrap(), "main.ts");
        assert_eq!(normalize_path("src/app.js").unwrap(), "src/app.js");
        assert_eq!(normalize_path("./local.txt").unwrap(), "local.txt");
        assert_eq!(normalize_path("src//lib/./x.ts").unwrap(), "src/lib/x.ts");
        assert_eq!(normalize_path("src/lib/../x.ts").unwrap(), "src/x.ts");
        assert_eq!(normalize_path("").unwrap(), "");
    }

    #[test]
    fn test_traversal_rejection() {
        assert!(normalize_path("../etc/passwd").is_err());
        assert!(normalize_path("src/../../etc/passwd").is_err());
    }

    #[test]
    fn test_absolute_path_rejection() {
        assert!(normalize_path("/etc/passwd").is_err());
        assert!(normalize_path("C:\\Windows\\System32").is_err());
        assert!(normalize_entry_path(".").is_err());
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(join("", "a.ts"), "a.ts");
        assert_eq!(join("src", "a.ts"), "src/a.ts");
        assert_eq!(parent("src/lib/a.ts"), "src/lib");
        assert_eq!(parent("a.ts"), "");
        assert_eq!(file_name("src/lib/a.ts"), "a.ts");
        assert!(is_within("src/lib/a.ts", "src"));
        assert!(is_within("src", "src"));
        assert!(!is_within("srcx/a.ts", "src"));
        assert_eq!(
            ancestors("a/b/c.ts").collect::<Vec<_>>(),
            vec!["a", "a/b"]
        );
    }
}
