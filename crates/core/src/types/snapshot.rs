use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::fs_policy;

// =============================================================================
// File Snapshot
// =============================================================================

/// Point-in-time flat capture of the sandbox filesystem.
///
/// Produced by every full read and superseded wholesale by the next one.
/// Shared as `Arc<FileSnapshot>` once published; never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    /// Relative file path to UTF-8 content.
    pub files: BTreeMap<String, String>,
    /// Known directory paths, including empty directories.
    pub directories: BTreeSet<String>,
}

impl FileSnapshot {
    pub fn new(files: BTreeMap<String, String>, directories: BTreeSet<String>) -> Self {
        Self { files, directories }
    }

    /// Snapshot whose directories are exactly those implied by its file paths.
    pub fn from_files(files: BTreeMap<String, String>) -> Self {
        let directories = implied_directories(files.keys().map(String::as_str));
        Self { files, directories }
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }

    /// Derives the ordered display tree for this snapshot.
    pub fn tree(&self) -> Vec<FileNode> {
        crate::tree::build_file_tree(&self.files, &self.directories)
    }
}

/// Every directory implied by the given file paths.
pub fn implied_directories<'a>(paths: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    for path in paths {
        for dir in fs_policy::ancestors(path) {
            dirs.insert(dir.to_string());
        }
    }
    dirs
}

// =============================================================================
// File Tree Nodes
// =============================================================================

/// Whether a tree node is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/// Node of the displayed file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FileNode {
    pub fn file(path: &str, content: &str) -> Self {
        Self {
            name: fs_policy::file_name(path).to_string(),
            path: path.to_string(),
            kind: NodeKind::File,
            children: None,
            content: Some(content.to_string()),
        }
    }

    pub fn directory(path: &str, children: Vec<FileNode>) -> Self {
        Self {
            name: fs_policy::file_name(path).to_string(),
            path: path.to_string(),
            kind: NodeKind::Directory,
            children: Some(children),
            content: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn children(&self) -> &[FileNode] {
        self.children.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_files_derives_directories() {
        let snapshot = FileSnapshot::from_files(BTreeMap::from([
            ("src/lib/a.ts".to_string(), "a".to_string()),
            ("index.html".to_string(), "<html>".to_string()),
        ]));
        assert_eq!(
            snapshot.directories.iter().cloned().collect::<Vec<_>>(),
            vec!["src".to_string(), "src/lib".to_string()]
        );
        assert_eq!(snapshot.file("index.html"), Some("<html>"));
        assert!(!snapshot.contains_file("src"));
    }

    #[test]
    fn test_node_serialization_omits_absent_fields() {
        let node = FileNode::file("a.ts", "x");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "file");
        assert!(json.get("children").is_none());
    }
}
