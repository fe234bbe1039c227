//! Single-document editor session.
//!
//! The session holds exactly one open file. User edits update the displayed
//! buffer immediately and reach the sandbox only after a quiet period; watcher
//! snapshots update the buffer only when they cannot clobber anything.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use playground_core::config::EditorConfig;
use playground_core::timer::{tokio_timer, Debouncer, Timer};
use playground_core::{FileSnapshot, Result, SandboxInstance};

use crate::language::{language_for_path, PLAIN_TEXT};

#[derive(Debug, Clone)]
struct PendingEdit {
    path: String,
    content: String,
    revision: u64,
}

#[derive(Debug, Default)]
struct SessionState {
    open_path: Option<String>,
    displayed: String,
    committed: String,
    pending: Option<PendingEdit>,
    revision: u64,
}

struct Shared {
    instance: Arc<dyn SandboxInstance>,
    state: Mutex<SessionState>,
    commits: AtomicUsize,
}

impl Shared {
    /// Write the pending edit, if any. Returns whether a write happened.
    async fn commit(&self) -> Result<bool> {
        let Some(edit) = self.state.lock().pending.clone() else {
            return Ok(false);
        };

        self.instance.write_file(&edit.path, &edit.content).await?;
        self.commits.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        if state.open_path.as_deref() == Some(edit.path.as_str()) {
            state.committed = edit.content;
        }
        if state
            .pending
            .as_ref()
            .is_some_and(|p| p.revision == edit.revision)
        {
            state.pending = None;
        }
        tracing::debug!(path = %edit.path, revision = edit.revision, "Edit committed");
        Ok(true)
    }
}

/// Editor session bound to one sandbox instance.
pub struct EditorSession {
    shared: Arc<Shared>,
    debouncer: Debouncer,
}

impl EditorSession {
    pub fn new(instance: Arc<dyn SandboxInstance>, config: &EditorConfig) -> Self {
        Self::with_timer(instance, config.commit_debounce(), tokio_timer())
    }

    pub fn with_timer(
        instance: Arc<dyn SandboxInstance>,
        debounce: Duration,
        timer: Arc<dyn Timer>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                instance,
                state: Mutex::new(SessionState::default()),
                commits: AtomicUsize::new(0),
            }),
            debouncer: Debouncer::with_timer(debounce, timer),
        }
    }

    /// Show `path` with `content`, committing any pending edit of the
    /// previous file first.
    pub async fn open(&self, path: &str, content: &str) -> Result<()> {
        if let Err(e) = self.flush().await {
            tracing::warn!(error = %e, "Failed to commit pending edit before switching files");
        }
        let mut state = self.shared.state.lock();
        state.open_path = Some(path.to_string());
        state.displayed = content.to_string();
        state.committed = content.to_string();
        state.pending = None;
        tracing::debug!(path = %path, language = language_for_path(path), "File opened");
        Ok(())
    }

    pub fn open_path(&self) -> Option<String> {
        self.shared.state.lock().open_path.clone()
    }

    /// Buffer content as displayed.
    pub fn content(&self) -> String {
        self.shared.state.lock().displayed.clone()
    }

    /// Content last known to be in the sandbox.
    pub fn committed(&self) -> String {
        self.shared.state.lock().committed.clone()
    }

    pub fn language(&self) -> &'static str {
        self.shared
            .state
            .lock()
            .open_path
            .as_deref()
            .map(language_for_path)
            .unwrap_or(PLAIN_TEXT)
    }

    pub fn has_pending(&self) -> bool {
        self.shared.state.lock().pending.is_some()
    }

    /// Writes to the sandbox so far.
    pub fn commit_count(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    /// Apply a watcher snapshot to the open buffer.
    ///
    /// No-op unless a file is open and present in the snapshot. A buffer with
    /// an uncommitted edit is left alone; the edit lands with the next commit.
    /// Returns whether the buffer changed.
    pub fn sync(&self, snapshot: &FileSnapshot) -> bool {
        let mut state = self.shared.state.lock();
        let Some(path) = state.open_path.clone() else {
            return false;
        };
        let Some(content) = snapshot.file(&path) else {
            return false;
        };
        if state.pending.is_some() {
            tracing::debug!(path = %path, "Skipping sync over uncommitted edit");
            return false;
        }
        if state.displayed == content {
            return false;
        }
        state.displayed = content.to_string();
        state.committed = content.to_string();
        tracing::debug!(path = %path, "Buffer updated from sandbox");
        true
    }

    /// Record a user edit and restart the commit quiet period.
    pub fn on_change(&self, content: &str) {
        {
            let mut state = self.shared.state.lock();
            let Some(path) = state.open_path.clone() else {
                return;
            };
            state.revision += 1;
            state.displayed = content.to_string();
            state.pending = Some(PendingEdit {
                path,
                content: content.to_string(),
                revision: state.revision,
            });
        }

        let shared = self.shared.clone();
        self.debouncer.schedule(async move {
            if let Err(e) = shared.commit().await {
                tracing::warn!(error = %e, "Debounced commit failed; edit stays pending");
            }
        });
    }

    /// Commit a pending edit now. Returns whether anything was written.
    pub async fn flush(&self) -> Result<bool> {
        self.debouncer.cancel();
        self.shared.commit().await
    }

    /// Flush and forget the open file.
    pub async fn close(&self) -> Result<()> {
        let flushed = self.flush().await;
        {
            let mut state = self.shared.state.lock();
            state.open_path = None;
            state.displayed.clear();
            state.committed.clear();
            state.pending = None;
        }
        flushed.map(|_| ())
    }
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("open_path", &self.open_path())
            .field("pending", &self.has_pending())
            .finish()
    }
}
