//! Workspace coordinator.
//!
//! Owns the currently open project and everything bound to its sandbox
//! instance. Opening a project cancels the previous one completely before
//! the new files are mounted: the watch is unsubscribed, the editor is
//! flushed and closed, every type registration is disposed and the gateway
//! is reset so the next boot starts from a fresh instance.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use playground_core::config::AppConfig;
use playground_core::{
    fs_policy, CodeIntelligence, Error, FileNode, FileSnapshot, Project, ProjectStore, Result,
    SandboxInstance, SavedProject,
};
use playground_editor::{EditorSession, TypeLoader};
use playground_sandbox::{
    clear_file_system, mount_project, ops, read_all_files_skipping, watch_file_system,
    SnapshotSink, WatchOptions, WatchSubscription, WorkspaceHandle,
};
use playground_store::{export_archive, to_clipboard_text, PersistenceFilter};
use playground_terminal::InstallGate;

/// Collaborators shared by every project a workspace opens.
#[derive(Clone)]
pub struct WorkspaceContext {
    pub handle: Arc<WorkspaceHandle>,
    pub intelligence: Arc<dyn CodeIntelligence>,
    pub config: AppConfig,
}

/// Read-only projections of the latest snapshot.
#[derive(Default)]
struct View {
    snapshot: Arc<FileSnapshot>,
    tree: Arc<Vec<FileNode>>,
}

fn publish(view: &RwLock<View>, snapshot: Arc<FileSnapshot>) {
    let tree = Arc::new(snapshot.tree());
    let mut view = view.write();
    view.snapshot = snapshot;
    view.tree = tree;
}

/// Receives watcher snapshots for one open project.
struct ProjectSink {
    view: Arc<RwLock<View>>,
    editor: Arc<EditorSession>,
}

#[async_trait]
impl SnapshotSink for ProjectSink {
    async fn apply(&self, snapshot: Arc<FileSnapshot>) {
        publish(&self.view, snapshot.clone());
        if self.editor.sync(&snapshot) {
            tracing::debug!("Editor buffer refreshed from sandbox");
        }
    }
}

/// Everything bound to the instance of the open project.
struct ActiveProject {
    project: Project,
    instance: Arc<dyn SandboxInstance>,
    editor: Arc<EditorSession>,
    types: Arc<TypeLoader>,
    watch: WatchSubscription,
}

pub struct Workspace {
    context: WorkspaceContext,
    filter: PersistenceFilter,
    gate: InstallGate,
    view: Arc<RwLock<View>>,
    active: RwLock<Option<Arc<ActiveProject>>>,
    transition: tokio::sync::Mutex<()>,
}

impl Workspace {
    pub fn new(context: WorkspaceContext) -> Self {
        let filter = PersistenceFilter::from_config(&context.config.store);
        Self {
            context,
            filter,
            gate: InstallGate::new(),
            view: Arc::new(RwLock::new(View::default())),
            active: RwLock::new(None),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    /// Gate consulted by the watch loop; share it with the terminal bridge so
    /// install churn does not trigger resyncs.
    pub fn install_gate(&self) -> InstallGate {
        self.gate.clone()
    }

    fn current(&self) -> Option<Arc<ActiveProject>> {
        self.active.read().clone()
    }

    fn require_current(&self) -> Result<Arc<ActiveProject>> {
        self.current()
            .ok_or_else(|| Error::operation("no project is open"))
    }

    // =========================================================================
    // Project lifecycle
    // =========================================================================

    /// Replace the open project with `project` and return its first snapshot.
    pub async fn open_project(&self, project: Project) -> Result<Arc<FileSnapshot>> {
        let _transition = self.transition.lock().await;
        self.close_current().await;

        let config = &self.context.config;
        let instance = self.context.handle.get_instance().await?;
        let cleared = clear_file_system(&*instance).await?;
        mount_project(&*instance, &project.files).await?;

        let snapshot = Arc::new(read_all_files_skipping(&*instance, &config.sync.skip_dirs).await);
        publish(&self.view, snapshot.clone());

        let editor = Arc::new(EditorSession::new(instance.clone(), &config.editor));
        if let Some(entry) = project.entry_file() {
            let content = snapshot
                .file(entry)
                .or_else(|| project.files.get(entry).map(String::as_str))
                .unwrap_or_default();
            editor.open(entry, content).await?;
        }

        let gate = self.gate.clone();
        let options = WatchOptions::from_config(&config.sync).with_ignore_if(move || gate.installing());
        let sink = Arc::new(ProjectSink {
            view: self.view.clone(),
            editor: editor.clone(),
        });
        let watch = watch_file_system(instance.clone(), sink, options).await;

        let types = Arc::new(TypeLoader::new(
            instance.clone(),
            self.context.intelligence.clone(),
            config.intellisense.clone(),
        ));
        types.configure()?;
        if let Err(e) = types.watch_manifest().await {
            tracing::warn!(error = %e, "Manifest watch unavailable; types load only on request");
        }
        types.schedule_load();

        tracing::info!(
            project_id = %project.id,
            instance = instance.id(),
            cleared,
            files = snapshot.files.len(),
            watching = watch.is_live(),
            "Project opened"
        );
        *self.active.write() = Some(Arc::new(ActiveProject {
            project,
            instance,
            editor,
            types,
            watch,
        }));
        Ok(snapshot)
    }

    /// Close the open project. Returns whether one was open.
    pub async fn close_project(&self) -> bool {
        let _transition = self.transition.lock().await;
        self.close_current().await
    }

    async fn close_current(&self) -> bool {
        let active = self.active.write().take();
        let Some(active) = active else {
            return false;
        };

        active.watch.unsubscribe();
        if let Err(e) = active.editor.close().await {
            tracing::warn!(error = %e, "Pending edit lost while closing project");
        }
        let disposed = active.types.teardown();

        if let Some(previous) = self.context.handle.reset_instance() {
            if let Err(e) = previous.teardown().await {
                tracing::warn!(instance = previous.id(), error = %e, "Sandbox teardown failed");
            }
        }
        *self.view.write() = View::default();

        tracing::info!(project_id = %active.project.id, disposed, "Project closed");
        true
    }

    /// Hook for the end of the dependency install: resync once and reload
    /// types, since the gate suppressed every event while it ran.
    pub fn on_install_finished(&self, code: i32) {
        let Some(active) = self.current() else {
            return;
        };
        tracing::info!(code, "Install finished; refreshing workspace");
        active.watch.trigger();
        active.types.schedule_load();
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn project(&self) -> Option<Project> {
        self.current().map(|active| active.project.clone())
    }

    pub fn snapshot(&self) -> Arc<FileSnapshot> {
        self.view.read().snapshot.clone()
    }

    pub fn tree(&self) -> Arc<Vec<FileNode>> {
        self.view.read().tree.clone()
    }

    pub fn editor(&self) -> Option<Arc<EditorSession>> {
        self.current().map(|active| active.editor.clone())
    }

    pub fn types(&self) -> Option<Arc<TypeLoader>> {
        self.current().map(|active| active.types.clone())
    }

    /// Whether the open project has a live watch. Without one the workspace
    /// only changes on [`refresh`](Self::refresh).
    pub fn is_watching(&self) -> bool {
        self.current().is_some_and(|active| active.watch.is_live())
    }

    /// Re-read the sandbox now.
    pub async fn refresh(&self) -> Result<Arc<FileSnapshot>> {
        let active = self.require_current()?;
        self.refresh_active(&active).await
    }

    async fn refresh_active(&self, active: &ActiveProject) -> Result<Arc<FileSnapshot>> {
        let snapshot = Arc::new(
            read_all_files_skipping(&*active.instance, &self.context.config.sync.skip_dirs).await,
        );
        publish(&self.view, snapshot.clone());
        active.editor.sync(&snapshot);
        Ok(snapshot)
    }

    // =========================================================================
    // Structural operations
    // =========================================================================

    pub async fn create_file(&self, path: &str, content: &str) -> Result<String> {
        let active = self.require_current()?;
        let path = ops::create_file(&*active.instance, path, content).await?;
        self.refresh_active(&active).await?;
        Ok(path)
    }

    pub async fn create_directory(&self, path: &str) -> Result<String> {
        let active = self.require_current()?;
        let path = ops::create_directory(&*active.instance, path).await?;
        self.refresh_active(&active).await?;
        Ok(path)
    }

    /// Delete an entry. An open file at or below it is closed first.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let active = self.require_current()?;
        let path = fs_policy::normalize_entry_path(path)?;
        if self.open_file_within(&active, &path).is_some() {
            active.editor.close().await?;
        }
        ops::delete(&*active.instance, &path).await?;
        self.refresh_active(&active).await?;
        Ok(())
    }

    pub async fn rename(&self, path: &str, new_name: &str) -> Result<String> {
        let active = self.require_current()?;
        let path = fs_policy::normalize_entry_path(path)?;
        let reopen = self.prepare_relocation(&active, &path).await?;
        let target = ops::rename(&*active.instance, &path, new_name).await?;
        self.finish_relocation(&active, reopen, &path, &target).await?;
        Ok(target)
    }

    pub async fn move_entry(&self, path: &str, target_dir: &str) -> Result<String> {
        let active = self.require_current()?;
        let path = fs_policy::normalize_entry_path(path)?;
        let reopen = self.prepare_relocation(&active, &path).await?;
        let target = ops::move_entry(&*active.instance, &path, target_dir).await?;
        self.finish_relocation(&active, reopen, &path, &target).await?;
        Ok(target)
    }

    fn open_file_within(&self, active: &ActiveProject, path: &str) -> Option<String> {
        active
            .editor
            .open_path()
            .filter(|open| fs_policy::is_within(open, path))
    }

    /// Commit the open file before it moves, so the copy carries the edit.
    async fn prepare_relocation(&self, active: &ActiveProject, path: &str) -> Result<Option<String>> {
        let open = self.open_file_within(active, path);
        if open.is_some() {
            active.editor.flush().await?;
        }
        Ok(open)
    }

    async fn finish_relocation(
        &self,
        active: &ActiveProject,
        reopen: Option<String>,
        from: &str,
        to: &str,
    ) -> Result<()> {
        let snapshot = self.refresh_active(active).await?;
        if let Some(open) = reopen {
            let relative = open[from.len()..].trim_start_matches('/');
            let moved = if relative.is_empty() {
                to.to_string()
            } else {
                fs_policy::join(to, relative)
            };
            let content = snapshot.file(&moved).unwrap_or_default().to_string();
            active.editor.open(&moved, &content).await?;
            tracing::debug!(from = %open, to = %moved, "Open file followed its move");
        }
        Ok(())
    }

    // =========================================================================
    // Persistence boundary
    // =========================================================================

    /// Persist the open project with the current (filtered) sandbox content.
    pub async fn save(&self, store: &dyn ProjectStore) -> Result<SavedProject> {
        let active = self.require_current()?;
        active.editor.flush().await?;
        let snapshot = self.refresh_active(&active).await?;

        let mut project = active.project.clone();
        project.files = self.filter.apply(&snapshot).files;
        let saved = SavedProject::now(project);
        store.save(&saved).await?;
        Ok(saved)
    }

    pub fn export_archive(&self) -> Result<Vec<u8>> {
        let filtered = self.filter.apply(&self.snapshot());
        export_archive(&filtered.files)
    }

    pub fn clipboard_text(&self) -> String {
        let filtered = self.filter.apply(&self.snapshot());
        to_clipboard_text(&filtered.files)
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("project", &self.current().map(|a| a.project.id.clone()))
            .field("files", &self.snapshot().files.len())
            .finish()
    }
}
