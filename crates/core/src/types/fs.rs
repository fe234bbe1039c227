use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

// =============================================================================
// Directory Listing
// =============================================================================

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Entry returned by listing a sandbox directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

// =============================================================================
// Mount Tree
// =============================================================================

/// Nested description used to mount many files in one call.
///
/// Serializes to the runtime's mount shape:
/// `{"src": {"directory": {"a.ts": {"file": {"contents": "..."}}}}}`.
pub type MountTree = BTreeMap<String, MountEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountEntry {
    File { contents: String },
    Directory(MountTree),
}

// =============================================================================
// Watch Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsEventKind {
    Created,
    Modified,
    Removed,
    Renamed,
    Other,
}

/// Raw change notification delivered by a sandbox watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEvent {
    pub kind: FsEventKind,
    /// Path relative to the sandbox root.
    pub path: String,
}

impl FsEvent {
    pub fn new(kind: FsEventKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Live watch on a sandbox path.
///
/// Events arrive on `events` until the watch is closed. Dropping the watch
/// closes it as well; the guard owns whatever keeps the underlying watcher
/// alive.
pub struct FsWatch {
    pub events: mpsc::UnboundedReceiver<FsEvent>,
    guard: Box<dyn Send>,
}

impl FsWatch {
    pub fn new(events: mpsc::UnboundedReceiver<FsEvent>, guard: Box<dyn Send>) -> Self {
        Self { events, guard }
    }

    /// Close the underlying watch.
    pub fn close(self) {
        drop(self.guard);
    }

    /// Split into the event receiver and the guard that keeps the watch open.
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<FsEvent>, Box<dyn Send>) {
        (self.events, self.guard)
    }
}

impl std::fmt::Debug for FsWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsWatch").finish_non_exhaustive()
    }
}
