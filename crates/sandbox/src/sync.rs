//! Virtual filesystem synchronization.
//!
//! Full reads of the sandbox filesystem into [`FileSnapshot`]s, bulk
//! mounting, and the watch loop that re-reads the filesystem whenever it
//! changes from outside the editor.

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use playground_core::config::SyncConfig;
use playground_core::timer::{tokio_timer, Timer};
use playground_core::{
    fs_policy, FileSnapshot, MountEntry, MountTree, Result, SandboxInstance,
};

/// Directory names never descended into by a full read.
pub const DEFAULT_SKIP_DIRS: &[&str] = &["node_modules"];

// =============================================================================
// Reading
// =============================================================================

/// Read every file of the sandbox into a snapshot.
///
/// Skips `node_modules` and dot-prefixed entries. A file or directory that
/// cannot be read is logged and left out; the rest of the snapshot is still
/// returned.
pub async fn read_all_files(instance: &dyn SandboxInstance) -> FileSnapshot {
    let skip: Vec<String> = DEFAULT_SKIP_DIRS.iter().map(|s| s.to_string()).collect();
    read_all_files_skipping(instance, &skip).await
}

/// [`read_all_files`] with an explicit list of skipped directory names.
pub async fn read_all_files_skipping(
    instance: &dyn SandboxInstance,
    skip_dirs: &[String],
) -> FileSnapshot {
    walk(instance, String::new(), skip_dirs).await
}

fn walk<'a>(
    instance: &'a dyn SandboxInstance,
    dir: String,
    skip_dirs: &'a [String],
) -> BoxFuture<'a, FileSnapshot> {
    Box::pin(async move {
        let mut snapshot = FileSnapshot::default();

        let entries = match instance.read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir, error = %e, "Failed to list sandbox directory");
                return snapshot;
            }
        };

        for entry in entries {
            if entry.name.starts_with('.') {
                continue;
            }
            let path = fs_policy::join(&dir, &entry.name);

            if entry.is_directory() {
                if skip_dirs.iter().any(|s| s == &entry.name) {
                    continue;
                }
                let nested = walk(instance, path.clone(), skip_dirs).await;
                snapshot.directories.insert(path);
                snapshot.directories.extend(nested.directories);
                snapshot.files.extend(nested.files);
            } else {
                match instance.read_file(&path).await {
                    Ok(content) => {
                        snapshot.files.insert(path, content);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "Failed to read sandbox file");
                    }
                }
            }
        }

        snapshot
    })
}

// =============================================================================
// Mounting
// =============================================================================

/// Convert a flat path map into the nested mount description.
pub fn convert_files_to_file_tree(files: &BTreeMap<String, String>) -> MountTree {
    let mut tree = MountTree::new();

    'files: for (path, contents) in files {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((name, dirs)) = segments.split_last() else {
            continue;
        };

        let mut level = &mut tree;
        for dir in dirs {
            let entry = level
                .entry(dir.to_string())
                .or_insert_with(|| MountEntry::Directory(MountTree::new()));
            level = match entry {
                MountEntry::Directory(children) => children,
                MountEntry::File { .. } => {
                    tracing::warn!(path = %path, conflict = %dir, "File shadows a directory; skipping");
                    continue 'files;
                }
            };
        }

        level.insert(
            name.to_string(),
            MountEntry::File {
                contents: contents.clone(),
            },
        );
    }

    tree
}

/// Mount a project's files into the sandbox with a single mount call.
pub async fn mount_project(
    instance: &dyn SandboxInstance,
    files: &BTreeMap<String, String>,
) -> Result<()> {
    let tree = convert_files_to_file_tree(files);
    instance.mount(&tree).await?;
    tracing::debug!(files = files.len(), instance = instance.id(), "Project mounted");
    Ok(())
}

// =============================================================================
// Watching
// =============================================================================

/// Receiver of fresh snapshots produced by the watch loop.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn apply(&self, snapshot: Arc<FileSnapshot>);
}

/// Predicate consulted for every raw event; `true` drops the event.
pub type IgnorePredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Tuning of a watch loop.
#[derive(Clone)]
pub struct WatchOptions {
    pub ignore_if: IgnorePredicate,
    /// Quiet period after each resync during which events are dropped.
    pub cooldown: Duration,
    pub skip_dirs: Vec<String>,
    pub timer: Arc<dyn Timer>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl WatchOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            ignore_if: Arc::new(|| false),
            cooldown: config.watch_cooldown(),
            skip_dirs: config.skip_dirs.clone(),
            timer: tokio_timer(),
        }
    }

    pub fn with_ignore_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.ignore_if = Arc::new(predicate);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }
}

impl std::fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchOptions")
            .field("cooldown", &self.cooldown)
            .field("skip_dirs", &self.skip_dirs)
            .finish_non_exhaustive()
    }
}

struct WatchState {
    instance: Arc<dyn SandboxInstance>,
    sink: Arc<dyn SnapshotSink>,
    options: WatchOptions,
    live: AtomicBool,
    in_flight: AtomicBool,
    resyncs: AtomicUsize,
    dropped: AtomicUsize,
}

impl WatchState {
    /// Handle one change notification. Returns whether a resync started.
    fn on_event(self: &Arc<Self>) -> bool {
        if !self.live.load(Ordering::SeqCst) {
            return false;
        }
        if (self.options.ignore_if)() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let state = self.clone();
        tokio::spawn(async move { state.resync().await });
        true
    }

    async fn resync(&self) {
        let started = Instant::now();
        let snapshot = read_all_files_skipping(&*self.instance, &self.options.skip_dirs).await;
        let files = snapshot.files.len();

        if self.live.load(Ordering::SeqCst) {
            self.sink.apply(Arc::new(snapshot)).await;
        }

        self.resyncs.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("playground_resyncs_total").increment(1);
        metrics::histogram!("playground_resync_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::debug!(files, elapsed_ms = started.elapsed().as_millis() as u64, "Resync complete");

        self.options.timer.sleep(self.options.cooldown).await;
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Cancelable handle on a running watch loop.
///
/// Dropping the subscription unsubscribes.
pub struct WatchSubscription {
    state: Arc<WatchState>,
    guard: Mutex<Option<Box<dyn Send>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WatchSubscription {
    fn detached(state: Arc<WatchState>) -> Self {
        state.live.store(false, Ordering::SeqCst);
        Self {
            state,
            guard: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Close the watch. Resyncs already running finish without delivering.
    pub fn unsubscribe(&self) {
        self.state.live.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        if self.guard.lock().take().is_some() {
            tracing::debug!(instance = self.state.instance.id(), "Watch closed");
        }
    }

    /// Feed a synthetic change event through the same rules as real ones.
    pub fn trigger(&self) -> bool {
        self.state.on_event()
    }

    /// Whether the underlying watch is installed and open.
    pub fn is_live(&self) -> bool {
        self.state.live.load(Ordering::SeqCst)
    }

    pub fn is_resyncing(&self) -> bool {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// Completed resyncs so far.
    pub fn resync_count(&self) -> usize {
        self.state.resyncs.load(Ordering::SeqCst)
    }

    /// Events dropped by the ignore predicate, an in-flight resync or the cooldown.
    pub fn dropped_count(&self) -> usize {
        self.state.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("live", &self.is_live())
            .field("resyncs", &self.resync_count())
            .finish()
    }
}

/// Install one recursive watch at the sandbox root.
///
/// Every raw event passes through, in order: the ignore predicate, the
/// in-flight check (at most one resync at a time, extra events dropped, never
/// queued) and the post-resync cooldown. If the watch cannot be installed the
/// failure is logged and a detached subscription is returned.
pub async fn watch_file_system(
    instance: Arc<dyn SandboxInstance>,
    sink: Arc<dyn SnapshotSink>,
    options: WatchOptions,
) -> WatchSubscription {
    let state = Arc::new(WatchState {
        instance: instance.clone(),
        sink,
        options,
        live: AtomicBool::new(true),
        in_flight: AtomicBool::new(false),
        resyncs: AtomicUsize::new(0),
        dropped: AtomicUsize::new(0),
    });

    let watch = match instance.watch("", true).await {
        Ok(watch) => watch,
        Err(e) => {
            tracing::warn!(instance = instance.id(), error = %e, "Watch setup failed; falling back to manual refresh");
            return WatchSubscription::detached(state);
        }
    };

    let (mut events, guard) = watch.into_parts();
    let loop_state = state.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::trace!(path = %event.path, kind = ?event.kind, "Sandbox change");
            loop_state.on_event();
        }
    });

    tracing::debug!(instance = instance.id(), "Watch installed");
    WatchSubscription {
        state,
        guard: Mutex::new(Some(guard)),
        task: Mutex::new(Some(task)),
    }
}
