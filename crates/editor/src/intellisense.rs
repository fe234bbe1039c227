//! Type intelligence loader.
//!
//! Scans the sandbox package root for declaration files and package
//! manifests and registers them with the code-intelligence engine in
//! throttled batches. Loads are serialized: a request that arrives while a
//! load runs marks one follow-up load, no matter how many requests arrive.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use playground_core::config::IntellisenseConfig;
use playground_core::timer::{tokio_timer, Timer};
use playground_core::{
    fs_policy, CodeIntelligence, CompilerOptions, Disposable, Error, Result, SandboxInstance,
};

use crate::format::default_formatters;

/// Theme applied when the engine is configured.
pub const DEFAULT_THEME: &str = "vs-dark";

const DECLARATION_SUFFIXES: &[&str] = &[".d.ts", ".d.mts", ".d.cts"];
const MANIFEST_NAME: &str = "package.json";

/// Virtual path under which a sandbox file is registered.
pub fn virtual_path(path: &str) -> String {
    format!("file:///{}", path)
}

/// Whether a file name is a declaration file or a package manifest.
pub fn is_type_source(name: &str) -> bool {
    name == MANIFEST_NAME || DECLARATION_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Outcome of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub discovered: usize,
    pub registered: usize,
    pub failed: usize,
    pub disposed: usize,
}

/// A registration held by the loader.
struct TypeDefinitionEntry {
    handle: Box<dyn Disposable>,
}

#[derive(Debug, Default)]
struct Schedule {
    running: bool,
    follow_up: bool,
}

struct LoaderInner {
    instance: Arc<dyn SandboxInstance>,
    engine: Arc<dyn CodeIntelligence>,
    config: IntellisenseConfig,
    timer: Arc<dyn Timer>,
    registry: DashMap<String, TypeDefinitionEntry>,
    schedule: Mutex<Schedule>,
    idle: watch::Sender<bool>,
    loads: AtomicUsize,
    configured: AtomicBool,
    torn_down: AtomicBool,
    manifest_watch: Mutex<Option<(JoinHandle<()>, Box<dyn Send>)>>,
}

impl LoaderInner {
    fn schedule_load(self: &Arc<Self>) {
        {
            let mut schedule = self.schedule.lock();
            if self.torn_down.load(Ordering::SeqCst) {
                return;
            }
            if schedule.running {
                schedule.follow_up = true;
                return;
            }
            schedule.running = true;
            self.idle.send_replace(false);
        }

        let inner = self.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = inner.load_type_definitions().await {
                    tracing::warn!(error = %e, "Type definition load failed");
                }
                let mut schedule = inner.schedule.lock();
                if schedule.follow_up && !inner.torn_down.load(Ordering::SeqCst) {
                    schedule.follow_up = false;
                    continue;
                }
                schedule.running = false;
                schedule.follow_up = false;
                inner.idle.send_replace(true);
                break;
            }
        });
    }

    async fn load_type_definitions(&self) -> Result<LoadReport> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let root = fs_policy::normalize_path(&self.config.types_root)?;
        let paths = collect_type_sources(&*self.instance, root).await;

        let mut report = LoadReport {
            discovered: paths.len(),
            ..Default::default()
        };
        let mut seen = HashSet::with_capacity(paths.len());
        let batch_size = self.config.batch_size.max(1);

        for (index, batch) in paths.chunks(batch_size).enumerate() {
            if index > 0 {
                self.timer.sleep(self.config.batch_delay()).await;
            }
            for path in batch {
                if self.torn_down.load(Ordering::SeqCst) {
                    return Ok(report);
                }
                let virtual_path = virtual_path(path);
                seen.insert(virtual_path.clone());

                let loaded = match self.instance.read_file(path).await {
                    Ok(content) => self.register(&virtual_path, &content),
                    Err(e) => Err(Error::type_load(path.as_str(), e.to_string())),
                };
                match loaded {
                    Ok(()) => report.registered += 1,
                    Err(e) => {
                        report.failed += 1;
                        metrics::counter!("playground_type_load_failures_total").increment(1);
                        tracing::warn!(path = %path, error = %e, "Skipping type definition");
                    }
                }
            }
        }

        let stale: Vec<String> = self
            .registry
            .iter()
            .filter(|entry| !seen.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for key in stale {
            if let Some((_, entry)) = self.registry.remove(&key) {
                entry.handle.dispose();
                report.disposed += 1;
            }
        }

        tracing::info!(
            discovered = report.discovered,
            registered = report.registered,
            failed = report.failed,
            disposed = report.disposed,
            "Type definitions loaded"
        );
        Ok(report)
    }

    /// Replace whatever is registered at `virtual_path` with `content`.
    fn register(&self, virtual_path: &str, content: &str) -> Result<()> {
        if let Some((_, previous)) = self.registry.remove(virtual_path) {
            previous.handle.dispose();
        }
        let handle = self
            .engine
            .add_extra_lib(content, virtual_path)
            .map_err(|e| Error::type_load(virtual_path, e.to_string()))?;
        self.registry
            .insert(virtual_path.to_string(), TypeDefinitionEntry { handle });
        metrics::counter!("playground_type_libs_registered_total").increment(1);

        // A teardown that raced this registration must not leak it.
        if self.torn_down.load(Ordering::SeqCst) {
            if let Some((_, entry)) = self.registry.remove(virtual_path) {
                entry.handle.dispose();
            }
        }
        Ok(())
    }

    fn dispose_all(&self) -> usize {
        let keys: Vec<String> = self.registry.iter().map(|e| e.key().clone()).collect();
        let mut disposed = 0;
        for key in keys {
            if let Some((_, entry)) = self.registry.remove(&key) {
                entry.handle.dispose();
                disposed += 1;
            }
        }
        disposed
    }
}

fn collect_type_sources(
    instance: &dyn SandboxInstance,
    dir: String,
) -> Pin<Box<dyn Future<Output = Vec<String>> + Send + '_>> {
    Box::pin(async move {
        let entries = match instance.read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %dir, error = %e, "Package root not readable");
                return Vec::new();
            }
        };
        let mut found = Vec::new();
        for entry in entries {
            let path = fs_policy::join(&dir, &entry.name);
            if entry.is_directory() {
                found.extend(collect_type_sources(instance, path).await);
            } else if is_type_source(&entry.name) {
                found.push(path);
            }
        }
        found
    })
}

/// Scheduler and registry of type definitions for one sandbox instance.
pub struct TypeLoader {
    inner: Arc<LoaderInner>,
}

impl TypeLoader {
    pub fn new(
        instance: Arc<dyn SandboxInstance>,
        engine: Arc<dyn CodeIntelligence>,
        config: IntellisenseConfig,
    ) -> Self {
        Self::with_timer(instance, engine, config, tokio_timer())
    }

    pub fn with_timer(
        instance: Arc<dyn SandboxInstance>,
        engine: Arc<dyn CodeIntelligence>,
        config: IntellisenseConfig,
        timer: Arc<dyn Timer>,
    ) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            inner: Arc::new(LoaderInner {
                instance,
                engine,
                config,
                timer,
                registry: DashMap::new(),
                schedule: Mutex::new(Schedule::default()),
                idle,
                loads: AtomicUsize::new(0),
                configured: AtomicBool::new(false),
                torn_down: AtomicBool::new(false),
                manifest_watch: Mutex::new(None),
            }),
        }
    }

    /// Apply compiler options, theme and formatters. Only the first call
    /// reaches the engine.
    pub fn configure(&self) -> Result<()> {
        if self.inner.configured.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let engine = &self.inner.engine;
        engine.set_compiler_options(&CompilerOptions::default())?;
        engine.set_theme(DEFAULT_THEME)?;
        for (language, formatter) in default_formatters() {
            engine.register_document_formatting_provider(language, formatter)?;
        }
        tracing::debug!("Code intelligence configured");
        Ok(())
    }

    /// Request a load; coalesces with a load already in flight.
    pub fn schedule_load(&self) {
        self.inner.schedule_load();
    }

    /// Run one scan now, outside the scheduler.
    pub async fn load_type_definitions(&self) -> Result<LoadReport> {
        self.inner.load_type_definitions().await
    }

    /// Reload whenever the manifest at the sandbox root changes.
    pub async fn watch_manifest(&self) -> Result<()> {
        let manifest = fs_policy::normalize_entry_path(&self.inner.config.manifest_file)?;
        let watch_dir = fs_policy::parent(&manifest).to_string();
        let watch = self.inner.instance.watch(&watch_dir, false).await?;
        let (mut events, guard) = watch.into_parts();

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event.path == manifest {
                    tracing::debug!(kind = ?event.kind, "Manifest changed; scheduling type load");
                    inner.schedule_load();
                }
            }
        });

        if let Some((previous, _)) = self.inner.manifest_watch.lock().replace((task, guard)) {
            previous.abort();
        }
        Ok(())
    }

    /// Wait until no load is running or queued.
    pub async fn wait_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        let _ = idle.wait_for(|idle| *idle).await;
    }

    pub fn is_loading(&self) -> bool {
        !*self.inner.idle.borrow()
    }

    /// Scans started so far.
    pub fn load_count(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }

    /// Virtual paths currently registered, sorted.
    pub fn registered_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.inner.registry.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }

    /// Stop watching, drop any queued load and dispose every registration.
    pub fn teardown(&self) -> usize {
        self.inner.torn_down.store(true, Ordering::SeqCst);
        self.inner.schedule.lock().follow_up = false;
        if let Some((task, guard)) = self.inner.manifest_watch.lock().take() {
            task.abort();
            drop(guard);
        }
        let disposed = self.inner.dispose_all();
        tracing::debug!(disposed, "Type loader torn down");
        disposed
    }
}

impl std::fmt::Debug for TypeLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeLoader")
            .field("registered", &self.inner.registry.len())
            .field("loads", &self.load_count())
            .finish()
    }
}
