//! Sandbox runtime boundary.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{DirEntry, FsWatch, MountTree, SandboxProcess, SpawnOptions};

// =============================================================================
// Runtime
// =============================================================================

/// Factory for sandbox instances.
///
/// The runtime is the only thing that knows how to boot; everything else
/// talks to the booted [`SandboxInstance`].
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Check the host precondition for booting (isolation).
    ///
    /// Called before every boot attempt. An error here is surfaced as
    /// `Error::BootPrecondition` and no boot is attempted.
    fn check_isolation(&self) -> Result<()>;

    /// Boot a new sandbox instance.
    async fn boot(&self) -> Result<Arc<dyn SandboxInstance>>;
}

// =============================================================================
// Instance
// =============================================================================

/// A booted sandbox: virtual filesystem plus process spawning.
///
/// All paths are relative to the sandbox root; `""` is the root itself.
#[async_trait]
pub trait SandboxInstance: Send + Sync {
    /// Identifier of this instance (for logs).
    fn id(&self) -> &str;

    /// Read a UTF-8 file.
    async fn read_file(&self, path: &str) -> Result<String>;

    /// Write a UTF-8 file, replacing any existing content. The parent must exist.
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// List the direct entries of a directory.
    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Create a directory; with `recursive`, create missing parents and
    /// succeed if it already exists.
    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()>;

    /// Remove a file or directory; directories need `recursive`.
    async fn rm(&self, path: &str, recursive: bool) -> Result<()>;

    /// Watch a path for changes.
    async fn watch(&self, path: &str, recursive: bool) -> Result<FsWatch>;

    /// Mount a whole tree of files at the root in one call.
    async fn mount(&self, tree: &MountTree) -> Result<()>;

    /// Spawn a process inside the sandbox.
    async fn spawn(
        &self,
        command: &str,
        args: &[String],
        options: SpawnOptions,
    ) -> Result<SandboxProcess>;

    /// Release every resource held by this instance.
    async fn teardown(&self) -> Result<()>;
}
