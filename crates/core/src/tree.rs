//! File tree builder.
//!
//! Derives the ordered display tree from a flat snapshot. Pure and
//! deterministic: equal inputs always yield structurally equal trees.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::fs_policy;
use crate::types::{FileNode, NodeKind};

#[derive(Default)]
struct DirBuilder<'a> {
    dirs: BTreeMap<&'a str, DirBuilder<'a>>,
    files: BTreeMap<&'a str, (&'a str, &'a str)>,
}

impl<'a> DirBuilder<'a> {
    fn dir_mut(&mut self, path: &'a str) -> &mut DirBuilder<'a> {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = node.dirs.entry(segment).or_default();
        }
        node
    }

    fn into_nodes(self, prefix: &str) -> Vec<FileNode> {
        let mut nodes: Vec<FileNode> = Vec::with_capacity(self.dirs.len() + self.files.len());
        for (name, dir) in self.dirs {
            let path = fs_policy::join(prefix, name);
            let children = dir.into_nodes(&path);
            nodes.push(FileNode::directory(&path, children));
        }
        for (path, content) in self.files.into_values() {
            nodes.push(FileNode::file(path, content));
        }
        nodes.sort_by(compare_nodes);
        nodes
    }
}

/// Builds the display tree from a flat file map and the known directories.
///
/// Every directory in `directories` becomes a node even when it holds no
/// files. Intermediate directories of file paths are created implicitly.
/// Each level lists directories before files, then case-insensitive
/// alphabetical order.
pub fn build_file_tree(
    files: &BTreeMap<String, String>,
    directories: &BTreeSet<String>,
) -> Vec<FileNode> {
    let mut root = DirBuilder::default();

    for dir in directories {
        root.dir_mut(dir);
    }

    for (path, content) in files {
        let parent = fs_policy::parent(path);
        let name = fs_policy::file_name(path);
        if name.is_empty() {
            continue;
        }
        root.dir_mut(parent)
            .files
            .insert(name, (path.as_str(), content.as_str()));
    }

    root.into_nodes("")
}

/// Sibling order: directories first, then case-insensitive by name.
pub fn compare_nodes(a: &FileNode, b: &FileNode) -> Ordering {
    let rank = |node: &FileNode| match node.kind {
        NodeKind::Directory => 0,
        NodeKind::File => 1,
    };
    rank(a)
        .cmp(&rank(b))
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

/// Find a node by its full path.
pub fn find_node<'a>(nodes: &'a [FileNode], path: &str) -> Option<&'a FileNode> {
    for node in nodes {
        if node.path == path {
            return Some(node);
        }
        if node.is_directory() && fs_policy::is_within(path, &node.path) {
            return find_node(node.children(), path);
        }
    }
    None
}

/// Depth-first listing of `(depth, node)` pairs in display order.
pub fn flatten(nodes: &[FileNode]) -> Vec<(usize, &FileNode)> {
    fn walk<'a>(nodes: &'a [FileNode], depth: usize, out: &mut Vec<(usize, &'a FileNode)>) {
        for node in nodes {
            out.push((depth, node));
            walk(node.children(), depth + 1, out);
        }
    }

    let mut out = Vec::new();
    walk(nodes, 0, &mut out);
    out
}
