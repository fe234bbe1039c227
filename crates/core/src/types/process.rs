use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

use crate::{Error, Result};

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Options for spawning a process inside the sandbox.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Working directory relative to the sandbox root.
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    /// Attach a terminal of this size (interactive processes).
    pub terminal: Option<TerminalSize>,
}

impl SpawnOptions {
    pub fn with_terminal(mut self, size: TerminalSize) -> Self {
        self.terminal = Some(size);
        self
    }
}

/// Message sent to a running process's input side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessControl {
    Data(String),
    Resize(TerminalSize),
}

/// Write-only handle to a process's input. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ProcessInput {
    tx: mpsc::UnboundedSender<ProcessControl>,
}

impl ProcessInput {
    pub fn new(tx: mpsc::UnboundedSender<ProcessControl>) -> Self {
        Self { tx }
    }

    /// Channel pair for implementing a process: the handle and the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProcessControl>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn write(&self, data: &str) -> Result<()> {
        self.tx
            .send(ProcessControl::Data(data.to_string()))
            .map_err(|_| Error::process("process input is closed"))
    }

    pub fn resize(&self, size: TerminalSize) -> Result<()> {
        self.tx
            .send(ProcessControl::Resize(size))
            .map_err(|_| Error::process("process input is closed"))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Process spawned inside the sandbox.
#[derive(Debug)]
pub struct SandboxProcess {
    /// Combined output, in chunks, until the process exits.
    pub output: mpsc::Receiver<String>,
    /// Resolves with the exit code.
    pub exit: oneshot::Receiver<i32>,
    pub input: ProcessInput,
}

impl SandboxProcess {
    /// Await the exit code. A dropped exit sender counts as failure (`-1`).
    pub async fn wait(exit: oneshot::Receiver<i32>) -> i32 {
        exit.await.unwrap_or(-1)
    }
}
