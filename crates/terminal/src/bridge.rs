//! Terminal bridge.
//!
//! Runs the dependency install and then an interactive shell inside the
//! sandbox, wiring both to a terminal emulator. One bridge initializes at
//! most once.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use playground_core::config::TerminalConfig;
use playground_core::{
    Error, ProcessInput, Result, SandboxInstance, SandboxProcess, SpawnOptions, TerminalEmulator,
    TerminalSize,
};

/// Shared flag that is raised while the install process runs.
#[derive(Debug, Clone, Default)]
pub struct InstallGate {
    installing: Arc<AtomicBool>,
}

impl InstallGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn installing(&self) -> bool {
        self.installing.load(Ordering::SeqCst)
    }

    fn set(&self, installing: bool) {
        self.installing.store(installing, Ordering::SeqCst);
    }
}

/// Callback run once the install has finished, with its exit code.
pub type InstallHook = Arc<dyn Fn(i32) + Send + Sync>;

struct WriterState {
    input: Mutex<Option<ProcessInput>>,
    ready: watch::Sender<bool>,
}

/// Write-only handle to the interactive shell.
#[derive(Clone)]
pub struct ShellWriter {
    state: Arc<WriterState>,
}

impl Default for ShellWriter {
    fn default() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            state: Arc::new(WriterState {
                input: Mutex::new(None),
                ready,
            }),
        }
    }
}

impl ShellWriter {
    fn attach(&self, input: ProcessInput) {
        *self.state.input.lock() = Some(input);
        self.state.ready.send_replace(true);
    }

    fn detach(&self) {
        self.state.input.lock().take();
        self.state.ready.send_replace(false);
    }

    fn input(&self) -> Result<ProcessInput> {
        self.state
            .input
            .lock()
            .clone()
            .ok_or_else(|| Error::terminal("shell is not running"))
    }

    /// Send raw data to the shell.
    pub fn write(&self, data: &str) -> Result<()> {
        self.input()?.write(data)
    }

    /// Send a command line followed by a newline.
    pub fn run_command(&self, command: &str) -> Result<()> {
        tracing::debug!(command = %command, "Injecting shell command");
        self.write(&format!("{}\n", command))
    }

    pub fn resize(&self, size: TerminalSize) -> Result<()> {
        self.input()?.resize(size)
    }

    pub fn is_ready(&self) -> bool {
        *self.state.ready.borrow()
    }

    /// Wait until the shell accepts input.
    pub async fn ready(&self) {
        let mut ready = self.state.ready.subscribe();
        let _ = ready.wait_for(|ready| *ready).await;
    }
}

impl std::fmt::Debug for ShellWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellWriter")
            .field("ready", &self.is_ready())
            .finish()
    }
}

struct Session {
    instance: Arc<dyn SandboxInstance>,
    terminal: Arc<dyn TerminalEmulator>,
    config: TerminalConfig,
    gate: InstallGate,
    writer: ShellWriter,
    hook: Option<InstallHook>,
    exit: Arc<watch::Sender<Option<i32>>>,
}

impl Session {
    async fn run(self) {
        let size = self.terminal.fit();

        self.gate.set(true);
        let install_code = self.install(size).await;
        self.gate.set(false);
        if let Some(hook) = &self.hook {
            hook(install_code);
        }

        let code = self.shell(size).await;
        self.exit.send_replace(Some(code));
    }

    async fn install(&self, size: TerminalSize) -> i32 {
        let command = &self.config.install_command;
        let args = &self.config.install_args;
        tracing::info!(command = %command, args = ?args, "Running install");

        let process = self
            .instance
            .spawn(command, args, SpawnOptions::default().with_terminal(size))
            .await;
        let code = match process {
            Ok(mut process) => {
                while let Some(chunk) = process.output.recv().await {
                    self.terminal.write(&chunk);
                }
                SandboxProcess::wait(process.exit).await
            }
            Err(e) => {
                self.terminal
                    .write(&format!("\r\nFailed to start '{}': {}\r\n", command, e));
                -1
            }
        };

        if code == 0 {
            tracing::info!("Install finished");
        } else {
            tracing::warn!(code, "Install failed; starting shell anyway");
            self.terminal
                .write(&format!("\r\n[install exited with code {}]\r\n", code));
        }
        code
    }

    async fn shell(&self, size: TerminalSize) -> i32 {
        let command = &self.config.shell_command;
        let process = self
            .instance
            .spawn(
                command,
                &self.config.shell_args,
                SpawnOptions::default().with_terminal(size),
            )
            .await;
        let mut process = match process {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(command = %command, error = %e, "Failed to start shell");
                self.terminal
                    .write(&format!("\r\nFailed to start '{}': {}\r\n", command, e));
                return -1;
            }
        };

        let input = process.input.clone();
        let mut keystrokes = self.terminal.on_data();
        let forward = tokio::spawn(async move {
            while let Some(data) = keystrokes.recv().await {
                if input.write(&data).is_err() {
                    break;
                }
            }
        });
        self.writer.attach(process.input.clone());
        tracing::info!(command = %command, "Shell ready");

        while let Some(chunk) = process.output.recv().await {
            self.terminal.write(&chunk);
        }
        let code = SandboxProcess::wait(process.exit).await;

        forward.abort();
        self.writer.detach();
        tracing::info!(code, "Shell exited");
        code
    }
}

/// Bridge between one terminal widget and the sandbox's shell.
pub struct TerminalBridge {
    instance: Arc<dyn SandboxInstance>,
    terminal: Arc<dyn TerminalEmulator>,
    config: TerminalConfig,
    gate: InstallGate,
    writer: ShellWriter,
    hook: Mutex<Option<InstallHook>>,
    started: AtomicBool,
    exit: Arc<watch::Sender<Option<i32>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TerminalBridge {
    pub fn new(
        instance: Arc<dyn SandboxInstance>,
        terminal: Arc<dyn TerminalEmulator>,
        config: TerminalConfig,
    ) -> Self {
        let (exit, _) = watch::channel(None);
        Self {
            instance,
            terminal,
            config,
            gate: InstallGate::new(),
            writer: ShellWriter::default(),
            hook: Mutex::new(None),
            started: AtomicBool::new(false),
            exit: Arc::new(exit),
            task: Mutex::new(None),
        }
    }

    /// Share an existing gate, e.g. one already wired into a watcher.
    pub fn with_install_gate(mut self, gate: InstallGate) -> Self {
        self.gate = gate;
        self
    }

    /// Run `hook` with the install's exit code once it finishes.
    pub fn with_install_hook<F>(self, hook: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        *self.hook.lock() = Some(Arc::new(hook));
        self
    }

    pub fn install_gate(&self) -> InstallGate {
        self.gate.clone()
    }

    pub fn writer(&self) -> ShellWriter {
        self.writer.clone()
    }

    /// Start install then shell. Returns false if already initialized.
    pub fn init(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Terminal bridge already initialized");
            return false;
        }

        let session = Session {
            instance: self.instance.clone(),
            terminal: self.terminal.clone(),
            config: self.config.clone(),
            gate: self.gate.clone(),
            writer: self.writer.clone(),
            hook: self.hook.lock().clone(),
            exit: self.exit.clone(),
        };
        *self.task.lock() = Some(tokio::spawn(session.run()));
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Refit the terminal and pass the new size to the shell.
    pub fn resize(&self) -> Result<TerminalSize> {
        let size = self.terminal.fit();
        self.writer.resize(size)?;
        Ok(size)
    }

    /// Exit code of the shell, once it has exited.
    pub fn shell_exit(&self) -> Option<i32> {
        *self.exit.borrow()
    }

    /// Wait for the shell to exit.
    pub async fn wait_shell_exit(&self) -> i32 {
        let mut exit = self.exit.subscribe();
        let code = match exit.wait_for(|code| code.is_some()).await {
            Ok(code) => (*code).unwrap_or(-1),
            Err(_) => -1,
        };
        code
    }

    /// Stop forwarding and drop the shell.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.writer.detach();
        self.gate.set(false);
    }
}

impl Drop for TerminalBridge {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for TerminalBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalBridge")
            .field("initialized", &self.is_initialized())
            .field("installing", &self.gate.installing())
            .field("shell_ready", &self.writer.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_without_shell_errors() {
        let writer = ShellWriter::default();
        assert!(!writer.is_ready());
        assert!(matches!(writer.write("ls\n"), Err(Error::Terminal(_))));
        assert!(writer.resize(TerminalSize::default()).is_err());
    }

    #[tokio::test]
    async fn test_writer_attach_and_detach() {
        let writer = ShellWriter::default();
        let (input, mut rx) = ProcessInput::channel();

        writer.attach(input);
        writer.ready().await;
        writer.run_command("npm run dev").unwrap();
        assert_eq!(
            rx.recv().await,
            Some(playground_core::ProcessControl::Data("npm run dev\n".into()))
        );

        writer.detach();
        assert!(!writer.is_ready());
        assert!(writer.write("x").is_err());
    }
}
