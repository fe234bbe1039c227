//! In-memory implementations of the boundary traits for testing.
//!
//! These doubles are used across the workspace for unit and integration
//! tests: an in-memory sandbox with synthetic watch events, scriptable
//! processes and fault injection, a recording code-intelligence engine, and
//! a scripted terminal.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::{
    fs_policy,
    traits::{
        CodeIntelligence, CompilerOptions, Disposable, DocumentFormatter, SandboxInstance,
        SandboxRuntime, TerminalEmulator,
    },
    types::{
        DirEntry, FsEvent, FsEventKind, FsWatch, MountEntry, MountTree, ProcessControl,
        ProcessInput, SandboxProcess, SpawnOptions, TerminalSize,
    },
    Error, Result,
};

// =============================================================================
// Memory Runtime
// =============================================================================

/// Runtime that boots [`MemorySandbox`] instances.
pub struct MemoryRuntime {
    isolated: AtomicBool,
    failing_boots: AtomicUsize,
    boot_delay: Mutex<Duration>,
    boot_count: AtomicUsize,
    instances: Mutex<Vec<Arc<MemorySandbox>>>,
}

impl Default for MemoryRuntime {
    fn default() -> Self {
        Self {
            isolated: AtomicBool::new(true),
            failing_boots: AtomicUsize::new(0),
            boot_delay: Mutex::new(Duration::ZERO),
            boot_count: AtomicUsize::new(0),
            instances: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a host without isolation.
    pub fn set_isolated(&self, isolated: bool) {
        self.isolated.store(isolated, Ordering::SeqCst);
    }

    /// Make the next `count` boots fail.
    pub fn fail_next_boots(&self, count: usize) {
        self.failing_boots.store(count, Ordering::SeqCst);
    }

    /// Delay every boot by `delay`.
    pub fn set_boot_delay(&self, delay: Duration) {
        *self.boot_delay.lock() = delay;
    }

    /// Number of boot attempts so far.
    pub fn boot_count(&self) -> usize {
        self.boot_count.load(Ordering::SeqCst)
    }

    /// The most recently booted instance.
    pub fn last_instance(&self) -> Option<Arc<MemorySandbox>> {
        self.instances.lock().last().cloned()
    }
}

#[async_trait]
impl SandboxRuntime for MemoryRuntime {
    fn check_isolation(&self) -> Result<()> {
        if self.isolated.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::boot_precondition(
                "cross-origin isolation is not enabled on the host",
            ))
        }
    }

    async fn boot(&self) -> Result<Arc<dyn SandboxInstance>> {
        let attempt = self.boot_count.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = *self.boot_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .failing_boots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Error::boot_failure(format!("mock boot {} failed", attempt)));
        }

        let sandbox = Arc::new(MemorySandbox::with_id(format!("memory-sandbox-{}", attempt)));
        self.instances.lock().push(sandbox.clone());
        Ok(sandbox)
    }
}

// =============================================================================
// Memory Sandbox
// =============================================================================

/// Scripted behavior of a spawned command.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProcess {
    /// Output chunks emitted right after spawn.
    pub output: Vec<String>,
    pub exit_code: i32,
    /// Echo input back as output until `exit` is written.
    pub interactive: bool,
}

impl ScriptedProcess {
    pub fn exits(code: i32, output: &[&str]) -> Self {
        Self {
            output: output.iter().map(|s| s.to_string()).collect(),
            exit_code: code,
            interactive: false,
        }
    }

    pub fn shell(banner: &str) -> Self {
        Self {
            output: vec![banner.to_string()],
            exit_code: 0,
            interactive: true,
        }
    }
}

struct WatcherEntry {
    id: u64,
    path: String,
    recursive: bool,
    tx: mpsc::UnboundedSender<FsEvent>,
}

type Watchers = Arc<Mutex<Vec<WatcherEntry>>>;

struct WatchGuard {
    id: u64,
    watchers: Watchers,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.watchers.lock().retain(|w| w.id != self.id);
    }
}

#[derive(Default)]
struct MemoryFs {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
}

impl MemoryFs {
    fn dir_exists(&self, path: &str) -> bool {
        path.is_empty() || self.dirs.contains(path)
    }
}

/// In-memory sandbox instance.
pub struct MemorySandbox {
    id: String,
    fs: Mutex<MemoryFs>,
    watchers: Watchers,
    next_watch_id: AtomicU64,
    failing_reads: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
    failing_removes: Mutex<HashSet<String>>,
    fail_watch: AtomicBool,
    read_delay: Mutex<Duration>,
    scripts: Mutex<HashMap<String, ScriptedProcess>>,
    spawned: Mutex<Vec<String>>,
    stdin_log: Arc<Mutex<Vec<ProcessControl>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    torn_down: AtomicBool,
}

impl Default for MemorySandbox {
    fn default() -> Self {
        Self::with_id("memory-sandbox")
    }
}

impl MemorySandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fs: Mutex::new(MemoryFs::default()),
            watchers: Arc::new(Mutex::new(Vec::new())),
            next_watch_id: AtomicU64::new(1),
            failing_reads: Mutex::new(HashSet::new()),
            failing_writes: Mutex::new(HashSet::new()),
            failing_removes: Mutex::new(HashSet::new()),
            fail_watch: AtomicBool::new(false),
            read_delay: Mutex::new(Duration::ZERO),
            scripts: Mutex::new(HashMap::new()),
            spawned: Mutex::new(Vec::new()),
            stdin_log: Arc::new(Mutex::new(Vec::new())),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Seed a file directly, creating parent directories, without events.
    pub fn seed_file(&self, path: &str, content: &str) {
        let mut fs = self.fs.lock();
        for dir in fs_policy::ancestors(path) {
            fs.dirs.insert(dir.to_string());
        }
        fs.files.insert(path.to_string(), content.to_string());
    }

    /// Seed an empty directory (and its parents) without events.
    pub fn seed_dir(&self, path: &str) {
        let mut fs = self.fs.lock();
        for dir in fs_policy::ancestors(path) {
            fs.dirs.insert(dir.to_string());
        }
        fs.dirs.insert(path.to_string());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.fs.lock().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.fs.lock().dirs.contains(path)
    }

    pub fn files(&self) -> BTreeMap<String, String> {
        self.fs.lock().files.clone()
    }

    /// Make reads of `path` fail.
    pub fn fail_reads_of(&self, path: &str) {
        self.failing_reads.lock().insert(path.to_string());
    }

    /// Make writes of `path` fail.
    pub fn fail_writes_of(&self, path: &str) {
        self.failing_writes.lock().insert(path.to_string());
    }

    /// Make removal of `path` fail.
    pub fn fail_removes_of(&self, path: &str) {
        self.failing_removes.lock().insert(path.to_string());
    }

    /// Make every `watch` call fail.
    pub fn fail_watches(&self, fail: bool) {
        self.fail_watch.store(fail, Ordering::SeqCst);
    }

    /// Delay every `read_file` call.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock() = delay;
    }

    /// Script the behavior of `command`.
    pub fn script(&self, command: &str, process: ScriptedProcess) {
        self.scripts.lock().insert(command.to_string(), process);
    }

    /// Command lines spawned so far.
    pub fn spawned(&self) -> Vec<String> {
        self.spawned.lock().clone()
    }

    /// Everything written to interactive process inputs.
    pub fn stdin_log(&self) -> Vec<ProcessControl> {
        self.stdin_log.lock().clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn active_watches(&self) -> usize {
        self.watchers.lock().len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Deliver a synthetic event to every matching watch.
    pub fn emit(&self, event: FsEvent) {
        let watchers = self.watchers.lock();
        for watcher in watchers.iter() {
            let matches = if watcher.recursive {
                fs_policy::is_within(&event.path, &watcher.path)
            } else {
                event.path == watcher.path || fs_policy::parent(&event.path) == watcher.path
            };
            if matches {
                let _ = watcher.tx.send(event.clone());
            }
        }
    }

    fn mount_entries(fs: &mut MemoryFs, prefix: &str, tree: &MountTree, events: &mut Vec<FsEvent>) {
        for (name, entry) in tree {
            let path = fs_policy::join(prefix, name);
            match entry {
                MountEntry::File { contents } => {
                    fs.files.insert(path.clone(), contents.clone());
                    events.push(FsEvent::new(FsEventKind::Created, path));
                }
                MountEntry::Directory(children) => {
                    fs.dirs.insert(path.clone());
                    events.push(FsEvent::new(FsEventKind::Created, path.clone()));
                    Self::mount_entries(fs, &path, children, events);
                }
            }
        }
    }
}

#[async_trait]
impl SandboxInstance for MemorySandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.read_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing_reads.lock().contains(path) {
            return Err(Error::file_operation(path, "injected read failure"));
        }
        self.fs
            .lock()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::file_operation(path, "no such file"))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing_writes.lock().contains(path) {
            return Err(Error::file_operation(path, "injected write failure"));
        }
        let kind = {
            let mut fs = self.fs.lock();
            if !fs.dir_exists(fs_policy::parent(path)) {
                return Err(Error::file_operation(path, "parent directory does not exist"));
            }
            if fs.dirs.contains(path) {
                return Err(Error::file_operation(path, "is a directory"));
            }
            match fs.files.insert(path.to_string(), content.to_string()) {
                Some(_) => FsEventKind::Modified,
                None => FsEventKind::Created,
            }
        };
        self.emit(FsEvent::new(kind, path));
        Ok(())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let fs = self.fs.lock();
        if !fs.dir_exists(path) {
            return Err(Error::file_operation(path, "no such directory"));
        }
        let mut entries: Vec<DirEntry> = fs
            .dirs
            .iter()
            .filter(|d| fs_policy::parent(d) == path && d.as_str() != path)
            .map(|d| DirEntry::directory(fs_policy::file_name(d)))
            .chain(
                fs.files
                    .keys()
                    .filter(|f| fs_policy::parent(f) == path)
                    .map(|f| DirEntry::file(fs_policy::file_name(f))),
            )
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        {
            let mut fs = self.fs.lock();
            if fs.files.contains_key(path) {
                return Err(Error::file_operation(path, "a file exists at this path"));
            }
            if recursive {
                for dir in fs_policy::ancestors(path) {
                    fs.dirs.insert(dir.to_string());
                }
            } else {
                if fs.dirs.contains(path) {
                    return Err(Error::file_operation(path, "directory already exists"));
                }
                if !fs.dir_exists(fs_policy::parent(path)) {
                    return Err(Error::file_operation(path, "parent directory does not exist"));
                }
            }
            fs.dirs.insert(path.to_string());
        }
        self.emit(FsEvent::new(FsEventKind::Created, path));
        Ok(())
    }

    async fn rm(&self, path: &str, recursive: bool) -> Result<()> {
        if self.failing_removes.lock().contains(path) {
            return Err(Error::file_operation(path, "injected remove failure"));
        }
        {
            let mut fs = self.fs.lock();
            if fs.files.remove(path).is_none() {
                if !fs.dirs.contains(path) {
                    return Err(Error::file_operation(path, "no such file or directory"));
                }
                let has_children = fs.files.keys().any(|f| fs_policy::is_within(f, path))
                    || fs
                        .dirs
                        .iter()
                        .any(|d| d != path && fs_policy::is_within(d, path));
                if has_children && !recursive {
                    return Err(Error::file_operation(path, "directory not empty"));
                }
                fs.files.retain(|f, _| !fs_policy::is_within(f, path));
                fs.dirs.retain(|d| !fs_policy::is_within(d, path));
            }
        }
        self.emit(FsEvent::new(FsEventKind::Removed, path));
        Ok(())
    }

    async fn watch(&self, path: &str, recursive: bool) -> Result<FsWatch> {
        if self.fail_watch.load(Ordering::SeqCst) {
            return Err(Error::watch_setup(format!("injected watch failure on '{}'", path)));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_watch_id.fetch_add(1, Ordering::SeqCst);
        self.watchers.lock().push(WatcherEntry {
            id,
            path: path.to_string(),
            recursive,
            tx,
        });
        let guard = WatchGuard {
            id,
            watchers: self.watchers.clone(),
        };
        Ok(FsWatch::new(rx, Box::new(guard)))
    }

    async fn mount(&self, tree: &MountTree) -> Result<()> {
        let mut events = Vec::new();
        {
            let mut fs = self.fs.lock();
            Self::mount_entries(&mut fs, "", tree, &mut events);
        }
        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    async fn spawn(
        &self,
        command: &str,
        args: &[String],
        _options: SpawnOptions,
    ) -> Result<SandboxProcess> {
        let line = std::iter::once(command.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.spawned.lock().push(line);

        let script = self
            .scripts
            .lock()
            .get(command)
            .cloned()
            .ok_or_else(|| Error::process(format!("{}: command not found", command)))?;

        let (output_tx, output_rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = oneshot::channel();
        let (input, mut input_rx) = ProcessInput::channel();
        let stdin_log = self.stdin_log.clone();

        tokio::spawn(async move {
            for chunk in script.output {
                if output_tx.send(chunk).await.is_err() {
                    break;
                }
            }
            if script.interactive {
                while let Some(control) = input_rx.recv().await {
                    stdin_log.lock().push(control.clone());
                    if let ProcessControl::Data(data) = control {
                        let _ = output_tx.send(data.clone()).await;
                        if data.trim() == "exit" {
                            break;
                        }
                    }
                }
            }
            let _ = exit_tx.send(script.exit_code);
        });

        Ok(SandboxProcess {
            output: output_rx,
            exit: exit_rx,
            input,
        })
    }

    async fn teardown(&self) -> Result<()> {
        self.torn_down.store(true, Ordering::SeqCst);
        self.watchers.lock().clear();
        Ok(())
    }
}

// =============================================================================
// Recording Code Intelligence
// =============================================================================

#[derive(Default)]
struct IntelligenceState {
    next_id: u64,
    libs: HashMap<u64, (String, String)>,
    added: usize,
    disposed: HashMap<String, usize>,
    failing_paths: HashSet<String>,
    formatters: HashMap<String, Arc<dyn DocumentFormatter>>,
    compiler_options: Option<CompilerOptions>,
    theme: Option<String>,
}

/// Code-intelligence engine that records every call.
#[derive(Default, Clone)]
pub struct RecordingCodeIntelligence {
    state: Arc<Mutex<IntelligenceState>>,
}

struct RecordedLib {
    id: u64,
    state: Arc<Mutex<IntelligenceState>>,
}

impl Disposable for RecordedLib {
    fn dispose(self: Box<Self>) {
        let mut state = self.state.lock();
        if let Some((path, _)) = state.libs.remove(&self.id) {
            *state.disposed.entry(path).or_insert(0) += 1;
        }
    }
}

impl RecordingCodeIntelligence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject registrations at `virtual_path`.
    pub fn fail_on(&self, virtual_path: &str) {
        self.state.lock().failing_paths.insert(virtual_path.to_string());
    }

    /// Virtual paths with an active registration, sorted, one per registration.
    pub fn active_libs(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .state
            .lock()
            .libs
            .values()
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    pub fn active_content(&self, virtual_path: &str) -> Option<String> {
        self.state
            .lock()
            .libs
            .values()
            .find(|(path, _)| path == virtual_path)
            .map(|(_, content)| content.clone())
    }

    /// Total successful registrations.
    pub fn added_count(&self) -> usize {
        self.state.lock().added
    }

    /// How many registrations at `virtual_path` were disposed.
    pub fn dispose_count(&self, virtual_path: &str) -> usize {
        self.state
            .lock()
            .disposed
            .get(virtual_path)
            .copied()
            .unwrap_or(0)
    }

    pub fn compiler_options(&self) -> Option<CompilerOptions> {
        self.state.lock().compiler_options.clone()
    }

    pub fn theme(&self) -> Option<String> {
        self.state.lock().theme.clone()
    }

    pub fn formatter(&self, language: &str) -> Option<Arc<dyn DocumentFormatter>> {
        self.state.lock().formatters.get(language).cloned()
    }
}

impl CodeIntelligence for RecordingCodeIntelligence {
    fn add_extra_lib(&self, content: &str, virtual_path: &str) -> Result<Box<dyn Disposable>> {
        let mut state = self.state.lock();
        if state.failing_paths.contains(virtual_path) {
            return Err(Error::type_load(virtual_path, "injected registration failure"));
        }
        state.next_id += 1;
        let id = state.next_id;
        state
            .libs
            .insert(id, (virtual_path.to_string(), content.to_string()));
        state.added += 1;
        Ok(Box::new(RecordedLib {
            id,
            state: self.state.clone(),
        }))
    }

    fn register_document_formatting_provider(
        &self,
        language: &str,
        provider: Arc<dyn DocumentFormatter>,
    ) -> Result<()> {
        self.state
            .lock()
            .formatters
            .insert(language.to_string(), provider);
        Ok(())
    }

    fn set_compiler_options(&self, options: &CompilerOptions) -> Result<()> {
        self.state.lock().compiler_options = Some(options.clone());
        Ok(())
    }

    fn set_theme(&self, theme: &str) -> Result<()> {
        self.state.lock().theme = Some(theme.to_string());
        Ok(())
    }
}

// =============================================================================
// Mock Terminal
// =============================================================================

/// Terminal that captures output and lets tests type input.
pub struct MockTerminal {
    output: Mutex<String>,
    input: Mutex<Option<mpsc::UnboundedSender<String>>>,
    size: TerminalSize,
    fits: AtomicUsize,
}

impl Default for MockTerminal {
    fn default() -> Self {
        Self::new(TerminalSize::default())
    }
}

impl MockTerminal {
    pub fn new(size: TerminalSize) -> Self {
        Self {
            output: Mutex::new(String::new()),
            input: Mutex::new(None),
            size,
            fits: AtomicUsize::new(0),
        }
    }

    /// Everything written to the terminal so far.
    pub fn output(&self) -> String {
        self.output.lock().clone()
    }

    /// Simulate keystrokes. Returns false when nobody listens.
    pub fn type_input(&self, data: &str) -> bool {
        match self.input.lock().as_ref() {
            Some(tx) => tx.send(data.to_string()).is_ok(),
            None => false,
        }
    }

    pub fn fit_count(&self) -> usize {
        self.fits.load(Ordering::SeqCst)
    }
}

impl TerminalEmulator for MockTerminal {
    fn write(&self, data: &str) {
        self.output.lock().push_str(data);
    }

    fn on_data(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.input.lock() = Some(tx);
        rx
    }

    fn fit(&self) -> TerminalSize {
        self.fits.fetch_add(1, Ordering::SeqCst);
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sandbox_fs() {
        let sandbox = MemorySandbox::new();
        sandbox.mkdir("src/lib", true).await.unwrap();
        sandbox.write_file("src/lib/a.ts", "a").await.unwrap();
        sandbox.write_file("index.ts", "i").await.unwrap();

        let root = sandbox.read_dir("").await.unwrap();
        assert_eq!(root, vec![DirEntry::file("index.ts"), DirEntry::directory("src")]);
        assert_eq!(sandbox.read_file("src/lib/a.ts").await.unwrap(), "a");

        assert!(sandbox.write_file("missing/x.ts", "x").await.is_err());
        assert!(sandbox.rm("src", false).await.is_err());
        sandbox.rm("src", true).await.unwrap();
        assert!(sandbox.read_file("src/lib/a.ts").await.is_err());
        assert!(!sandbox.has_dir("src/lib"));
    }

    #[tokio::test]
    async fn test_memory_sandbox_watch_and_close() {
        let sandbox = MemorySandbox::new();
        let mut watch = sandbox.watch("", true).await.unwrap();
        sandbox.write_file("a.ts", "a").await.unwrap();

        let event = watch.events.recv().await.unwrap();
        assert_eq!(event, FsEvent::new(FsEventKind::Created, "a.ts"));

        assert_eq!(sandbox.active_watches(), 1);
        watch.close();
        assert_eq!(sandbox.active_watches(), 0);
    }

    #[tokio::test]
    async fn test_recording_intelligence_dispose() {
        let engine = RecordingCodeIntelligence::new();
        let handle = engine.add_extra_lib("declare const x: number;", "file:///x.d.ts").unwrap();
        assert_eq!(engine.active_libs(), vec!["file:///x.d.ts".to_string()]);

        handle.dispose();
        assert!(engine.active_libs().is_empty());
        assert_eq!(engine.dispose_count("file:///x.d.ts"), 1);
    }
}
