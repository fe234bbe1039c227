//! Editor session and type loader integration tests.

use std::sync::Arc;
use std::time::Duration;

use playground_core::config::IntellisenseConfig;
use playground_core::mocks::{MemorySandbox, RecordingCodeIntelligence};
use playground_core::timer::tokio_timer;
use playground_core::{FileSnapshot, SandboxInstance};
use playground_editor::intellisense::DEFAULT_THEME;
use playground_editor::{EditorSession, TypeLoader};

// =============================================================================
// Helpers
// =============================================================================

fn editor(sandbox: &Arc<MemorySandbox>) -> EditorSession {
    EditorSession::with_timer(sandbox.clone(), Duration::from_secs(1), tokio_timer())
}

fn loader(sandbox: &Arc<MemorySandbox>, engine: &RecordingCodeIntelligence) -> TypeLoader {
    TypeLoader::new(
        sandbox.clone(),
        Arc::new(engine.clone()),
        IntellisenseConfig::default(),
    )
}

fn snapshot_of(sandbox: &MemorySandbox) -> FileSnapshot {
    FileSnapshot::from_files(sandbox.files())
}

// =============================================================================
// 1. Editor session
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_rapid_edits_commit_once_after_quiet_period() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.seed_file("src/main.ts", "");
    let session = editor(&sandbox);
    session.open("src/main.ts", "").await.unwrap();

    for text in ["c", "co", "con", "cons", "const"] {
        session.on_change(text);
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    assert_eq!(session.commit_count(), 0);
    assert_eq!(session.content(), "const");
    assert_eq!(sandbox.file("src/main.ts").as_deref(), Some(""));

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(session.commit_count(), 1);
    assert_eq!(sandbox.file("src/main.ts").as_deref(), Some("const"));
    assert_eq!(session.committed(), "const");
    assert!(!session.has_pending());
}

#[tokio::test(start_paused = true)]
async fn test_sync_guard_keeps_buffer_on_unrelated_snapshot() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.seed_file("src/App.tsx", "A");
    sandbox.seed_file("src/other.ts", "x");
    let session = editor(&sandbox);
    session.open("src/App.tsx", "A").await.unwrap();

    session.on_change("B");
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(sandbox.file("src/App.tsx").as_deref(), Some("B"));

    let unrelated = FileSnapshot::from_files(
        [("src/other.ts".to_string(), "y".to_string())].into_iter().collect(),
    );
    assert!(!session.sync(&unrelated));
    assert_eq!(session.content(), "B");

    // The file itself changed outside the editor.
    sandbox.write_file("src/App.tsx", "C").await.unwrap();
    assert!(session.sync(&snapshot_of(&sandbox)));
    assert_eq!(session.content(), "C");
}

#[tokio::test(start_paused = true)]
async fn test_open_commits_pending_edit_of_previous_file() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.seed_file("a.ts", "a");
    sandbox.seed_file("b.ts", "b");
    let session = editor(&sandbox);

    session.open("a.ts", "a").await.unwrap();
    session.on_change("a2");
    session.open("b.ts", "b").await.unwrap();

    assert_eq!(sandbox.file("a.ts").as_deref(), Some("a2"));
    assert_eq!(session.open_path().as_deref(), Some("b.ts"));
    assert_eq!(session.content(), "b");

    // The cancelled timer must not write anything later.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(session.commit_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_commit_stays_pending() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.seed_file("a.ts", "a");
    sandbox.fail_writes_of("a.ts");
    let session = editor(&sandbox);
    session.open("a.ts", "a").await.unwrap();

    session.on_change("edited");
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(session.has_pending());
    assert!(session.flush().await.is_err());
    assert_eq!(session.content(), "edited");
    assert_eq!(session.committed(), "a");
}

#[tokio::test]
async fn test_close_flushes_and_clears() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.seed_file("a.ts", "a");
    let session = editor(&sandbox);
    session.open("a.ts", "a").await.unwrap();
    session.on_change("closing");

    session.close().await.unwrap();

    assert_eq!(sandbox.file("a.ts").as_deref(), Some("closing"));
    assert!(session.open_path().is_none());
    assert_eq!(session.content(), "");
    assert!(!session.sync(&snapshot_of(&sandbox)));
}

#[tokio::test]
async fn test_edits_without_open_file_are_ignored() {
    let sandbox = Arc::new(MemorySandbox::new());
    let session = editor(&sandbox);
    session.on_change("nothing open");
    assert!(!session.has_pending());
    assert!(!session.flush().await.unwrap());
}

// =============================================================================
// 2. Type loader
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_schedule_load_coalesces_mid_flight_requests() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.seed_file("node_modules/x/index.d.ts", "export declare const x: number;");
    sandbox.set_read_delay(Duration::from_millis(50));
    let engine = RecordingCodeIntelligence::new();
    let types = loader(&sandbox, &engine);

    types.schedule_load();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(types.is_loading());
    types.schedule_load();
    types.schedule_load();

    types.wait_idle().await;
    assert_eq!(types.load_count(), 2);
    assert!(!types.is_loading());
}

#[tokio::test]
async fn test_reload_replaces_registration() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.seed_file("node_modules/x/index.d.ts", "v1");
    let engine = RecordingCodeIntelligence::new();
    let types = loader(&sandbox, &engine);

    types.load_type_definitions().await.unwrap();
    sandbox.seed_file("node_modules/x/index.d.ts", "v2");
    types.load_type_definitions().await.unwrap();

    let path = "file:///node_modules/x/index.d.ts";
    assert_eq!(engine.active_libs(), vec![path.to_string()]);
    assert_eq!(engine.active_content(path).as_deref(), Some("v2"));
    assert_eq!(engine.dispose_count(path), 1);
}

#[tokio::test]
async fn test_scan_finds_declarations_and_manifests_only() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.seed_file("node_modules/x/package.json", "{}");
    sandbox.seed_file("node_modules/x/index.d.ts", "");
    sandbox.seed_file("node_modules/x/index.js", "");
    sandbox.seed_file("node_modules/@types/node/fs.d.mts", "");
    sandbox.seed_file("src/app.d.ts", "");
    let engine = RecordingCodeIntelligence::new();
    let types = loader(&sandbox, &engine);

    let report = types.load_type_definitions().await.unwrap();

    assert_eq!(report.discovered, 3);
    assert_eq!(
        types.registered_paths(),
        vec![
            "file:///node_modules/@types/node/fs.d.mts",
            "file:///node_modules/x/index.d.ts",
            "file:///node_modules/x/package.json",
        ]
    );
}

#[tokio::test]
async fn test_per_file_failures_are_skipped() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.seed_file("node_modules/a/index.d.ts", "a");
    sandbox.seed_file("node_modules/b/index.d.ts", "b");
    sandbox.seed_file("node_modules/c/index.d.ts", "c");
    sandbox.fail_reads_of("node_modules/a/index.d.ts");
    let engine = RecordingCodeIntelligence::new();
    engine.fail_on("file:///node_modules/b/index.d.ts");
    let types = loader(&sandbox, &engine);

    let report = types.load_type_definitions().await.unwrap();

    assert_eq!(report.failed, 2);
    assert_eq!(report.registered, 1);
    assert_eq!(engine.active_libs(), vec!["file:///node_modules/c/index.d.ts"]);
}

#[tokio::test(start_paused = true)]
async fn test_batches_are_throttled() {
    let sandbox = Arc::new(MemorySandbox::new());
    for i in 0..5 {
        sandbox.seed_file(&format!("node_modules/p{}/index.d.ts", i), "");
    }
    let engine = RecordingCodeIntelligence::new();
    let config = IntellisenseConfig {
        batch_size: 2,
        batch_delay_ms: 50,
        ..Default::default()
    };
    let types = TypeLoader::new(sandbox.clone(), Arc::new(engine.clone()), config);

    let started = tokio::time::Instant::now();
    let report = types.load_type_definitions().await.unwrap();

    assert_eq!(report.registered, 5);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_millis(150));
}

#[tokio::test]
async fn test_vanished_files_are_disposed() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.seed_file("node_modules/a/index.d.ts", "a");
    sandbox.seed_file("node_modules/b/index.d.ts", "b");
    let engine = RecordingCodeIntelligence::new();
    let types = loader(&sandbox, &engine);
    types.load_type_definitions().await.unwrap();

    sandbox.rm("node_modules/b", true).await.unwrap();
    let report = types.load_type_definitions().await.unwrap();

    assert_eq!(report.disposed, 1);
    assert_eq!(engine.active_libs(), vec!["file:///node_modules/a/index.d.ts"]);
}

#[tokio::test(start_paused = true)]
async fn test_manifest_change_triggers_load() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.seed_file("package.json", "{}");
    let engine = RecordingCodeIntelligence::new();
    let types = loader(&sandbox, &engine);
    types.watch_manifest().await.unwrap();

    sandbox.write_file("README.md", "docs").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(types.load_count(), 0);

    sandbox
        .write_file("package.json", "{\"dependencies\":{\"x\":\"1\"}}")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    types.wait_idle().await;
    assert_eq!(types.load_count(), 1);
}

#[tokio::test]
async fn test_teardown_disposes_everything() {
    let sandbox = Arc::new(MemorySandbox::new());
    sandbox.seed_file("node_modules/a/index.d.ts", "a");
    sandbox.seed_file("node_modules/a/package.json", "{}");
    let engine = RecordingCodeIntelligence::new();
    let types = loader(&sandbox, &engine);
    types.watch_manifest().await.unwrap();
    types.load_type_definitions().await.unwrap();
    assert_eq!(engine.active_libs().len(), 2);

    assert_eq!(types.teardown(), 2);
    assert!(engine.active_libs().is_empty());
    assert_eq!(sandbox.active_watches(), 0);

    types.schedule_load();
    types.wait_idle().await;
    assert_eq!(types.load_count(), 1);
}

#[tokio::test]
async fn test_configure_applies_once() {
    let sandbox = Arc::new(MemorySandbox::new());
    let engine = RecordingCodeIntelligence::new();
    let types = loader(&sandbox, &engine);

    types.configure().unwrap();
    types.configure().unwrap();

    let options = engine.compiler_options().unwrap();
    assert!(options.strict);
    assert_eq!(options.jsx, "react-jsx");
    assert_eq!(engine.theme().as_deref(), Some(DEFAULT_THEME));
    let json = engine.formatter("json").unwrap();
    assert_eq!(json.format("{\"a\":1}").unwrap(), "{\n  \"a\": 1\n}\n");
    assert!(engine.formatter("typescript").is_some());
}
