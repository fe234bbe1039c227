#![deny(unused)]
//! Playground - browser-style code playground on a local sandbox.
//!
//! Usage: `playground [project-dir]`
//!
//! Opens the project in a fresh sandbox directory, runs the dependency
//! install and then an interactive shell on this terminal. Exits when the
//! shell exits or on Ctrl-C.

use std::sync::Arc;

use playground::{builtin_project, project_from_directory, Workspace, WorkspaceContext, DEFAULT_PROJECT};
use playground_core::config::AppConfig;
use playground_core::tree::flatten;
use playground_core::{FileNode, TerminalSize};
use playground_editor::HeadlessIntelligence;
use playground_sandbox::{LocalRuntime, WorkspaceHandle};
use playground_store::FileProjectStore;
use playground_terminal::{StdioTerminal, TerminalBridge};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    playground_telemetry::configure_tracing(&config.telemetry)?;
    let metrics = if config.telemetry.prometheus {
        Some(playground_telemetry::setup_metrics_recorder()?)
    } else {
        None
    };

    tracing::info!("Starting playground v{}", env!("CARGO_PKG_VERSION"));

    // =========================================================================
    // Project
    // =========================================================================
    let project = match std::env::args().nth(1) {
        Some(dir) => project_from_directory(&dir).await?,
        None => builtin_project(DEFAULT_PROJECT)
            .ok_or_else(|| anyhow::anyhow!("built-in project '{}' missing", DEFAULT_PROJECT))?,
    };

    // =========================================================================
    // Workspace
    // =========================================================================
    let handle = Arc::new(WorkspaceHandle::new(Arc::new(LocalRuntime::new(
        config.sandbox.clone(),
    ))));
    let intelligence = Arc::new(HeadlessIntelligence::new());
    let workspace = Arc::new(Workspace::new(WorkspaceContext {
        handle: handle.clone(),
        intelligence: intelligence.clone(),
        config: config.clone(),
    }));

    let snapshot = workspace.open_project(project).await?;
    tracing::info!(
        files = snapshot.files.len(),
        watching = workspace.is_watching(),
        "Workspace ready"
    );
    print_tree(&workspace.tree());

    // =========================================================================
    // Terminal
    // =========================================================================
    let instance = handle.get_instance().await?;
    let terminal = Arc::new(StdioTerminal::new(TerminalSize {
        cols: config.terminal.cols,
        rows: config.terminal.rows,
    }));
    let hook_workspace = workspace.clone();
    let bridge = TerminalBridge::new(instance, terminal, config.terminal.clone())
        .with_install_gate(workspace.install_gate())
        .with_install_hook(move |code| hook_workspace.on_install_finished(code));
    bridge.init();

    let exit_code = tokio::select! {
        code = bridge.wait_shell_exit() => {
            tracing::info!(code, "Shell exited");
            code
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            130
        }
    };

    // =========================================================================
    // Shutdown
    // =========================================================================
    bridge.shutdown();
    if let Some(types) = workspace.types() {
        tracing::info!(
            registered = types.registered_paths().len(),
            libs = intelligence.lib_count(),
            lib_bytes = intelligence.lib_bytes(),
            "Type definitions at shutdown"
        );
    }
    let store = FileProjectStore::from_config(&config.store);
    match workspace.save(&store).await {
        Ok(saved) => tracing::info!(
            project_id = %saved.project.id,
            files = saved.project.files.len(),
            "Project saved"
        ),
        Err(e) => tracing::warn!(error = %e, "Failed to save project"),
    }
    workspace.close_project().await;
    if let Err(e) = handle.dispose().await {
        tracing::warn!(error = %e, "Gateway dispose failed");
    }
    if let Some(metrics) = metrics {
        tracing::debug!(metrics = %metrics.render(), "Final metrics");
    }
    playground_telemetry::shutdown_tracing();

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

fn print_tree(tree: &[FileNode]) {
    for (depth, node) in flatten(tree) {
        let suffix = if node.is_directory() { "/" } else { "" };
        println!("{}{}{}", "  ".repeat(depth), node.name, suffix);
    }
}
