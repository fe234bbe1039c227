//! Sandbox integration tests.
//!
//! Exercises the gateway, synchronizer and structural operations against the
//! in-memory sandbox, and the local runtime against a temporary directory.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use playground_core::config::SandboxConfig;
use playground_core::mocks::{MemoryRuntime, MemorySandbox};
use playground_core::{Error, FileSnapshot, FsEvent, FsEventKind, SandboxInstance};
use playground_sandbox::{
    clear_file_system, mount_project, ops, read_all_files, watch_file_system, LocalRuntime,
    SnapshotSink, WatchOptions, WorkspaceHandle,
};

// =============================================================================
// Helpers
// =============================================================================

#[derive(Default)]
struct RecordingSink {
    snapshots: Mutex<Vec<Arc<FileSnapshot>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    work: Duration,
}

impl RecordingSink {
    fn with_work(work: Duration) -> Arc<Self> {
        Arc::new(Self {
            work,
            ..Default::default()
        })
    }

    fn count(&self) -> usize {
        self.snapshots.lock().len()
    }

    fn last(&self) -> Option<Arc<FileSnapshot>> {
        self.snapshots.lock().last().cloned()
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSink for RecordingSink {
    async fn apply(&self, snapshot: Arc<FileSnapshot>) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }
        self.snapshots.lock().push(snapshot);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn project_files() -> BTreeMap<String, String> {
    [
        ("index.html", "<script src=\"src/main.ts\"></script>"),
        ("package.json", "{\"name\":\"demo\"}"),
        ("src/main.ts", "import { greet } from './lib/greet';"),
        ("src/lib/greet.ts", "export const greet = () => 'hi';"),
    ]
    .iter()
    .map(|(p, c)| (p.to_string(), c.to_string()))
    .collect()
}

fn modified(path: &str) -> FsEvent {
    FsEvent::new(FsEventKind::Modified, path)
}

// =============================================================================
// 1. Mount and read back
// =============================================================================

#[tokio::test]
async fn test_mount_then_read_round_trip() {
    let sandbox = MemorySandbox::new();
    let files = project_files();

    mount_project(&sandbox, &files).await.unwrap();
    let snapshot = read_all_files(&sandbox).await;

    assert_eq!(snapshot.files, files);
    assert!(snapshot.directories.contains("src/lib"));
}

#[tokio::test]
async fn test_read_all_files_returns_partial_snapshot() {
    let sandbox = MemorySandbox::new();
    mount_project(&sandbox, &project_files()).await.unwrap();
    sandbox.fail_reads_of("src/main.ts");

    let snapshot = read_all_files(&sandbox).await;

    assert!(!snapshot.contains_file("src/main.ts"));
    assert!(snapshot.contains_file("src/lib/greet.ts"));
    assert_eq!(snapshot.files.len(), 3);
}

#[tokio::test]
async fn test_clear_then_mount_replaces_project() {
    let runtime = Arc::new(MemoryRuntime::new());
    let handle = WorkspaceHandle::new(runtime);
    let instance = handle.get_instance().await.unwrap();

    mount_project(&*instance, &project_files()).await.unwrap();
    clear_file_system(&*instance).await.unwrap();
    assert!(instance.read_dir("").await.unwrap().is_empty());

    let next = BTreeMap::from([("main.js".to_string(), "console.log(1)".to_string())]);
    mount_project(&*instance, &next).await.unwrap();
    assert_eq!(read_all_files(&*instance).await.files, next);
}

// =============================================================================
// 2. Watch coalescing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_event_burst_coalesces_into_one_resync() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.seed_file("a.ts", "a");
    let sink = RecordingSink::with_work(Duration::from_millis(5));

    let subscription =
        watch_file_system(sandbox.clone(), sink.clone(), WatchOptions::default()).await;
    assert!(subscription.is_live());

    // 50 events within 10 ms.
    for _ in 0..10 {
        for _ in 0..5 {
            sandbox.emit(modified("a.ts"));
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    let resyncs = subscription.resync_count();
    assert!((1..50).contains(&resyncs), "resyncs = {}", resyncs);
    assert_eq!(resyncs, 1);
    assert_eq!(sink.max_active(), 1);
    assert_eq!(subscription.dropped_count(), 49);
}

#[tokio::test(start_paused = true)]
async fn test_mount_storm_triggers_single_resync() {
    let sandbox = Arc::new(MemorySandbox::new());
    let sink = RecordingSink::with_work(Duration::ZERO);
    let subscription =
        watch_file_system(sandbox.clone(), sink.clone(), WatchOptions::default()).await;

    mount_project(&*sandbox, &project_files()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(subscription.resync_count(), 1);
    assert_eq!(sink.last().unwrap().files, project_files());
}

#[tokio::test(start_paused = true)]
async fn test_events_during_cooldown_are_dropped() {
    let sandbox = Arc::new(MemorySandbox::new());
    let sink = RecordingSink::with_work(Duration::ZERO);
    let subscription =
        watch_file_system(sandbox.clone(), sink.clone(), WatchOptions::default()).await;

    sandbox.emit(modified("a.ts"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    sandbox.emit(modified("a.ts"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(subscription.resync_count(), 1);

    // Cooldown (300 ms) has elapsed.
    tokio::time::sleep(Duration::from_millis(200)).await;
    sandbox.emit(modified("a.ts"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(subscription.resync_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_is_configurable() {
    let sandbox = Arc::new(MemorySandbox::new());
    let sink = RecordingSink::with_work(Duration::ZERO);
    let options = WatchOptions::default().with_cooldown(Duration::from_millis(20));
    let subscription = watch_file_system(sandbox.clone(), sink.clone(), options).await;

    for _ in 0..3 {
        sandbox.emit(modified("a.ts"));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(subscription.resync_count(), 3);
    assert_eq!(sink.count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_ignore_if_drops_events() {
    let sandbox = Arc::new(MemorySandbox::new());
    let sink = RecordingSink::with_work(Duration::ZERO);
    let installing = Arc::new(AtomicBool::new(true));
    let gate = installing.clone();
    let options = WatchOptions::default().with_ignore_if(move || gate.load(Ordering::SeqCst));
    let subscription = watch_file_system(sandbox.clone(), sink.clone(), options).await;

    for _ in 0..20 {
        sandbox.emit(FsEvent::new(FsEventKind::Created, "node_modules/x/index.js"));
    }
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(subscription.resync_count(), 0);
    assert_eq!(subscription.dropped_count(), 20);

    installing.store(false, Ordering::SeqCst);
    assert!(subscription.trigger());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(subscription.resync_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_stops_resyncs() {
    let sandbox = Arc::new(MemorySandbox::new());
    let sink = RecordingSink::with_work(Duration::ZERO);
    let subscription =
        watch_file_system(sandbox.clone(), sink.clone(), WatchOptions::default()).await;
    assert_eq!(sandbox.active_watches(), 1);

    subscription.unsubscribe();
    assert_eq!(sandbox.active_watches(), 0);
    assert!(!subscription.is_live());

    sandbox.write_file("a.ts", "a").await.unwrap();
    assert!(!subscription.trigger());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn test_watch_setup_failure_returns_detached_subscription() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.fail_watches(true);
    let sink = RecordingSink::with_work(Duration::ZERO);

    let subscription =
        watch_file_system(sandbox.clone(), sink.clone(), WatchOptions::default()).await;

    assert!(!subscription.is_live());
    assert!(!subscription.trigger());
    assert_eq!(sandbox.active_watches(), 0);
}

// =============================================================================
// 3. Structural operations
// =============================================================================

#[tokio::test]
async fn test_create_file_creates_parents() {
    let sandbox = MemorySandbox::new();
    let path = ops::create_file(&sandbox, "./src//components/Button.tsx", "export {}")
        .await
        .unwrap();

    assert_eq!(path, "src/components/Button.tsx");
    assert!(sandbox.has_dir("src/components"));
    assert_eq!(sandbox.file(&path).as_deref(), Some("export {}"));
}

#[tokio::test]
async fn test_operations_reject_escaping_paths() {
    let sandbox = MemorySandbox::new();
    assert!(matches!(
        ops::create_file(&sandbox, "../outside.ts", "").await,
        Err(Error::InvalidPath(_))
    ));
    assert!(matches!(
        ops::delete(&sandbox, "/etc/passwd").await,
        Err(Error::InvalidPath(_))
    ));
    assert!(matches!(ops::delete(&sandbox, "").await, Err(Error::InvalidPath(_))));
}

#[tokio::test]
async fn test_delete_directory_recursively() {
    let sandbox = MemorySandbox::new();
    mount_project(&sandbox, &project_files()).await.unwrap();

    ops::delete(&sandbox, "src").await.unwrap();

    assert!(!sandbox.has_dir("src"));
    assert!(sandbox.file("src/lib/greet.ts").is_none());
    assert!(matches!(
        ops::delete(&sandbox, "src").await,
        Err(Error::Operation(_))
    ));
}

#[tokio::test]
async fn test_rename_file() {
    let sandbox = MemorySandbox::new();
    mount_project(&sandbox, &project_files()).await.unwrap();

    let target = ops::rename(&sandbox, "src/main.ts", "index.ts").await.unwrap();

    assert_eq!(target, "src/index.ts");
    assert!(sandbox.file("src/main.ts").is_none());
    assert_eq!(
        sandbox.file("src/index.ts").as_deref(),
        Some("import { greet } from './lib/greet';")
    );
}

#[tokio::test]
async fn test_rename_onto_existing_entry_fails() {
    let sandbox = MemorySandbox::new();
    mount_project(&sandbox, &project_files()).await.unwrap();

    let err = ops::rename(&sandbox, "index.html", "package.json")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Operation(_)));
    assert!(sandbox.file("index.html").is_some());
}

#[tokio::test]
async fn test_move_directory_copies_everything() {
    let sandbox = MemorySandbox::new();
    mount_project(&sandbox, &project_files()).await.unwrap();
    sandbox.seed_dir("src/assets");
    sandbox.seed_dir("app");

    let target = ops::move_entry(&sandbox, "src", "app").await.unwrap();

    assert_eq!(target, "app/src");
    assert!(!sandbox.has_dir("src"));
    assert!(sandbox.has_dir("app/src/assets"));
    assert_eq!(
        sandbox.file("app/src/lib/greet.ts").as_deref(),
        Some("export const greet = () => 'hi';")
    );
}

#[tokio::test]
async fn test_failed_directory_move_leaves_source_intact() {
    let sandbox = MemorySandbox::new();
    sandbox.seed_file("src/a/1.ts", "one");
    sandbox.seed_file("src/a/2.ts", "two");
    sandbox.seed_dir("lib");
    sandbox.fail_writes_of("lib/a/2.ts");

    let err = ops::move_entry(&sandbox, "src/a", "lib").await.unwrap_err();

    let message = err.to_string();
    assert!(matches!(err, Error::Operation(_)));
    assert!(message.contains("src/a/2.ts"), "{}", message);
    assert!(message.contains("after copying 1 of 2 files"), "{}", message);
    assert_eq!(sandbox.file("src/a/1.ts").as_deref(), Some("one"));
    assert_eq!(sandbox.file("src/a/2.ts").as_deref(), Some("two"));
    // Partial copies stay at the destination.
    assert_eq!(sandbox.file("lib/a/1.ts").as_deref(), Some("one"));
}

#[tokio::test]
async fn test_move_file_to_root() {
    let sandbox = MemorySandbox::new();
    mount_project(&sandbox, &project_files()).await.unwrap();

    let target = ops::move_entry(&sandbox, "src/lib/greet.ts", "").await.unwrap();

    assert_eq!(target, "greet.ts");
    assert!(sandbox.file("greet.ts").is_some());
    assert!(sandbox.file("src/lib/greet.ts").is_none());
    assert!(sandbox.has_dir("src/lib"));
}

// =============================================================================
// 4. Local runtime
// =============================================================================

fn local_handle(scratch: &tempfile::TempDir) -> WorkspaceHandle {
    WorkspaceHandle::new(Arc::new(LocalRuntime::new(SandboxConfig {
        scratch_dir: scratch.path().to_path_buf(),
        require_isolation: true,
    })))
}

#[tokio::test]
async fn test_local_runtime_filesystem_round_trip() {
    let scratch = tempfile::tempdir().unwrap();
    let handle = local_handle(&scratch);
    let instance = handle.get_instance().await.unwrap();

    mount_project(&*instance, &project_files()).await.unwrap();
    assert_eq!(read_all_files(&*instance).await.files, project_files());

    ops::rename(&*instance, "src/lib", "util").await.unwrap();
    let snapshot = read_all_files(&*instance).await;
    assert!(snapshot.contains_file("src/util/greet.ts"));
    assert!(!snapshot.directories.contains("src/lib"));

    assert_eq!(clear_file_system(&*instance).await.unwrap(), 3);
    assert!(instance.read_dir("").await.unwrap().is_empty());

    handle.dispose().await.unwrap();
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_local_runtime_spawns_processes() {
    let scratch = tempfile::tempdir().unwrap();
    let handle = local_handle(&scratch);
    let instance = handle.get_instance().await.unwrap();
    instance.write_file("greeting.txt", "hello").await.unwrap();

    let mut process = instance
        .spawn("cat", &["greeting.txt".to_string()], Default::default())
        .await
        .unwrap();
    let mut output = String::new();
    while let Some(chunk) = process.output.recv().await {
        output.push_str(&chunk);
    }
    assert_eq!(output, "hello");
    assert_eq!(playground_core::SandboxProcess::wait(process.exit).await, 0);

    let mut echo = instance.spawn("cat", &[], Default::default()).await.unwrap();
    echo.input.write("ping\n").unwrap();
    let chunk = echo.output.recv().await.unwrap();
    assert_eq!(chunk, "ping\n");
    drop(echo.input);
    assert_eq!(playground_core::SandboxProcess::wait(echo.exit).await, 0);

    assert!(instance
        .spawn("definitely-not-a-command", &[], Default::default())
        .await
        .is_err());
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_local_runtime_watch_reports_relative_paths() {
    let scratch = tempfile::tempdir().unwrap();
    let handle = local_handle(&scratch);
    let instance = handle.get_instance().await.unwrap();
    instance.mkdir("src", false).await.unwrap();

    let mut watch = instance.watch("", true).await.unwrap();
    instance.write_file("src/new.ts", "x").await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match watch.events.recv().await {
                Some(event) if event.path == "src/new.ts" => break Some(event),
                Some(_) => continue,
                None => break None,
            }
        }
    })
    .await
    .unwrap();
    assert!(event.is_some());
    watch.close();
}
