//! Local-directory sandbox runtime.
//!
//! Every boot creates a fresh scratch directory under the configured base.
//! Filesystem calls go through `tokio::fs`, watches through `notify`, and
//! processes through `tokio::process` with piped stdio.

use async_trait::async_trait;
use futures::future::BoxFuture;
use notify::event::{EventKind, ModifyKind};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use playground_core::config::SandboxConfig;
use playground_core::{
    fs_policy, DirEntry, Error, FsEvent, FsEventKind, FsWatch, MountEntry, MountTree,
    ProcessControl, ProcessInput, Result, SandboxInstance, SandboxProcess, SandboxRuntime,
    SpawnOptions,
};

// =============================================================================
// Runtime
// =============================================================================

/// Runtime that boots [`LocalSandbox`] scratch directories.
#[derive(Debug, Clone)]
pub struct LocalRuntime {
    config: SandboxConfig,
}

impl LocalRuntime {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn base_dir(&self) -> &Path {
        &self.config.scratch_dir
    }
}

#[async_trait]
impl SandboxRuntime for LocalRuntime {
    /// The base directory must be absolute and must not contain the working
    /// directory, so clearing a sandbox never reaches the user's own files.
    fn check_isolation(&self) -> Result<()> {
        if !self.config.require_isolation {
            return Ok(());
        }
        let base = &self.config.scratch_dir;
        if !base.is_absolute() {
            return Err(Error::boot_precondition(format!(
                "scratch directory '{}' is not absolute",
                base.display()
            )));
        }
        let cwd = std::env::current_dir()?;
        if cwd.starts_with(base) {
            return Err(Error::boot_precondition(format!(
                "working directory '{}' lies inside the scratch directory '{}'",
                cwd.display(),
                base.display()
            )));
        }
        Ok(())
    }

    async fn boot(&self) -> Result<Arc<dyn SandboxInstance>> {
        let id = format!("local-{}", Uuid::new_v4());
        let root = self.config.scratch_dir.join(&id);
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::boot_failure(format!("{}: {}", root.display(), e)))?;
        // Watch events report canonical paths.
        let root = tokio::fs::canonicalize(&root).await.unwrap_or(root);
        tracing::info!(id = %id, root = %root.display(), "Local sandbox booted");
        Ok(Arc::new(LocalSandbox::new(id, root)))
    }
}

// =============================================================================
// Instance
// =============================================================================

/// Sandbox rooted at a scratch directory on the local disk.
pub struct LocalSandbox {
    id: String,
    root: PathBuf,
    shutdown: watch::Sender<bool>,
}

impl LocalSandbox {
    pub fn new(id: impl Into<String>, root: PathBuf) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            id: id.into(),
            root,
            shutdown,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = fs_policy::normalize_path(path)?;
        if relative.is_empty() {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(relative))
        }
    }

    fn relative(root: &Path, absolute: &Path) -> Option<String> {
        let relative = absolute.strip_prefix(root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(segments.join("/"))
    }

    fn mount_level<'a>(&'a self, dir: PathBuf, tree: &'a MountTree) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for (name, entry) in tree {
                let path = dir.join(name);
                match entry {
                    MountEntry::File { contents } => {
                        tokio::fs::write(&path, contents)
                            .await
                            .map_err(|e| Error::file_operation(path.display().to_string(), e.to_string()))?;
                    }
                    MountEntry::Directory(children) => {
                        tokio::fs::create_dir_all(&path)
                            .await
                            .map_err(|e| Error::file_operation(path.display().to_string(), e.to_string()))?;
                        self.mount_level(path, children).await?;
                    }
                }
            }
            Ok(())
        })
    }
}

fn map_event_kind(kind: &EventKind) -> FsEventKind {
    match kind {
        EventKind::Create(_) => FsEventKind::Created,
        EventKind::Modify(ModifyKind::Name(_)) => FsEventKind::Renamed,
        EventKind::Modify(_) => FsEventKind::Modified,
        EventKind::Remove(_) => FsEventKind::Removed,
        _ => FsEventKind::Other,
    }
}

/// Incremental UTF-8 decoding of a byte stream. A sequence split across
/// reads is held back until the rest of it arrives.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        let tail = rest.to_vec();
        self.pending = tail;
        out
    }

    /// Flush whatever is left at end of stream.
    fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

fn pump<R>(mut reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        let mut decoder = Utf8Decoder::default();
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    let tail = decoder.finish();
                    if !tail.is_empty() {
                        let _ = tx.send(tail).await;
                    }
                    break;
                }
                Ok(n) => {
                    let chunk = decoder.decode(&buf[..n]);
                    if chunk.is_empty() {
                        continue;
                    }
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Process output closed");
                    break;
                }
            }
        }
    });
}

#[async_trait]
impl SandboxInstance for LocalSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let absolute = self.resolve(path)?;
        tokio::fs::read_to_string(&absolute)
            .await
            .map_err(|e| Error::file_operation(path, e.to_string()))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let absolute = self.resolve(path)?;
        tokio::fs::write(&absolute, content)
            .await
            .map_err(|e| Error::file_operation(path, e.to_string()))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let absolute = self.resolve(path)?;
        let mut reader = tokio::fs::read_dir(&absolute)
            .await
            .map_err(|e| Error::file_operation(path, e.to_string()))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| Error::file_operation(path, e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::file_operation(fs_policy::join(path, &name), e.to_string()))?;
            entries.push(if file_type.is_dir() {
                DirEntry::directory(name)
            } else {
                DirEntry::file(name)
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        let absolute = self.resolve(path)?;
        let result = if recursive {
            tokio::fs::create_dir_all(&absolute).await
        } else {
            tokio::fs::create_dir(&absolute).await
        };
        result.map_err(|e| Error::file_operation(path, e.to_string()))
    }

    async fn rm(&self, path: &str, recursive: bool) -> Result<()> {
        let absolute = self.resolve(path)?;
        if absolute == self.root {
            return Err(Error::file_operation(path, "refusing to remove the sandbox root"));
        }
        let metadata = tokio::fs::symlink_metadata(&absolute)
            .await
            .map_err(|e| Error::file_operation(path, e.to_string()))?;
        let result = if metadata.is_dir() {
            if recursive {
                tokio::fs::remove_dir_all(&absolute).await
            } else {
                tokio::fs::remove_dir(&absolute).await
            }
        } else {
            tokio::fs::remove_file(&absolute).await
        };
        result.map_err(|e| Error::file_operation(path, e.to_string()))
    }

    async fn watch(&self, path: &str, recursive: bool) -> Result<FsWatch> {
        let absolute = self.resolve(path)?;
        let root = self.root.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                let Ok(event) = res else {
                    return;
                };
                let kind = map_event_kind(&event.kind);
                for path in &event.paths {
                    if let Some(relative) = Self::relative(&root, path) {
                        let _ = tx.send(FsEvent::new(kind, relative));
                    }
                }
            },
            Config::default(),
        )
        .map_err(|e| Error::watch_setup(e.to_string()))?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(&absolute, mode)
            .map_err(|e| Error::watch_setup(format!("{}: {}", absolute.display(), e)))?;

        Ok(FsWatch::new(rx, Box::new(watcher)))
    }

    async fn mount(&self, tree: &MountTree) -> Result<()> {
        self.mount_level(self.root.clone(), tree).await
    }

    async fn spawn(
        &self,
        command: &str,
        args: &[String],
        options: SpawnOptions,
    ) -> Result<SandboxProcess> {
        let cwd = match &options.cwd {
            Some(cwd) => self.resolve(cwd)?,
            None => self.root.clone(),
        };

        let mut child = Command::new(command)
            .args(args)
            .current_dir(&cwd)
            .envs(&options.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::process(format!("{}: {}", command, e)))?;

        tracing::debug!(command = %command, args = ?args, sandbox = %self.id, "Process spawned");

        let (output_tx, output_rx) = mpsc::channel(64);
        if let Some(stdout) = child.stdout.take() {
            pump(stdout, output_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            pump(stderr, output_tx);
        }

        let (input, mut input_rx) = ProcessInput::channel();
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                while let Some(control) = input_rx.recv().await {
                    match control {
                        ProcessControl::Data(data) => {
                            if stdin.write_all(data.as_bytes()).await.is_err()
                                || stdin.flush().await.is_err()
                            {
                                break;
                            }
                        }
                        // Pipes carry no window size.
                        ProcessControl::Resize(size) => {
                            tracing::trace!(cols = size.cols, rows = size.rows, "Resize ignored");
                        }
                    }
                }
            });
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let mut shutdown = self.shutdown.subscribe();
        let command = command.to_string();
        tokio::spawn(async move {
            let code = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => status.code().unwrap_or(-1),
                    Err(e) => {
                        tracing::warn!(command = %command, error = %e, "Failed to wait for process");
                        -1
                    }
                },
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(command = %command, error = %e, "Failed to kill process");
                    }
                    -1
                }
            };
            tracing::debug!(command = %command, code, "Process exited");
            let _ = exit_tx.send(code);
        });

        Ok(SandboxProcess {
            output: output_rx,
            exit: exit_rx,
            input,
        })
    }

    async fn teardown(&self) -> Result<()> {
        self.shutdown.send_replace(true);
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::file_operation(self.root.display().to_string(), e.to_string())),
        }
        tracing::info!(id = %self.id, "Local sandbox torn down");
        Ok(())
    }
}

impl std::fmt::Debug for LocalSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSandbox")
            .field("id", &self.id)
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_use_forward_slashes() {
        let root = PathBuf::from("/tmp/sandbox");
        assert_eq!(
            LocalSandbox::relative(&root, &root.join("src").join("a.ts")).as_deref(),
            Some("src/a.ts")
        );
        assert_eq!(LocalSandbox::relative(&root, Path::new("/elsewhere")), None);
    }

    #[test]
    fn test_decoder_joins_characters_split_across_reads() {
        let bytes = "a\u{e9}\u{2714}".as_bytes();
        let mut decoder = Utf8Decoder::default();

        assert_eq!(decoder.decode(&bytes[..2]), "a");
        assert_eq!(decoder.decode(&bytes[2..4]), "\u{e9}");
        assert_eq!(decoder.decode(&bytes[4..5]), "");
        assert_eq!(decoder.decode(&bytes[5..]), "\u{2714}");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes_and_flushes_tail() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"ok\xffgo\xc3"), "ok\u{fffd}go");
        assert_eq!(decoder.finish(), "\u{fffd}");
    }

    #[tokio::test]
    async fn test_process_output_keeps_multibyte_characters_across_reads() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new("utf8", dir.path().to_path_buf());
        let script = format!("printf '%s\\303\\251' {}", "a".repeat(4095));
        let mut process = match sandbox
            .spawn("sh", &["-c".to_string(), script], SpawnOptions::default())
            .await
        {
            Ok(process) => process,
            Err(_) => return,
        };

        let mut output = String::new();
        while let Some(chunk) = process.output.recv().await {
            output.push_str(&chunk);
        }
        let tail: String = output.chars().rev().take(4).collect();
        assert!(output.ends_with('\u{e9}'), "tail (reversed): {:?}", tail);
        assert!(!output.contains(char::REPLACEMENT_CHARACTER));
        assert_eq!(output.chars().count(), 4096);
    }

    #[tokio::test]
    async fn test_teardown_kills_running_processes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("instance");
        std::fs::create_dir_all(&root).unwrap();
        let sandbox = LocalSandbox::new("kill", root);
        let process = match sandbox
            .spawn("sleep", &["30".to_string()], SpawnOptions::default())
            .await
        {
            Ok(process) => process,
            Err(_) => return,
        };

        sandbox.teardown().await.unwrap();
        let code = tokio::time::timeout(std::time::Duration::from_secs(5), process.exit)
            .await
            .expect("process killed on teardown")
            .unwrap();
        assert_eq!(code, -1);
    }

    #[test]
    fn test_isolation_rejects_relative_base() {
        let runtime = LocalRuntime::new(SandboxConfig {
            scratch_dir: PathBuf::from("relative/scratch"),
            require_isolation: true,
        });
        assert!(matches!(
            runtime.check_isolation(),
            Err(Error::BootPrecondition(_))
        ));
    }

    #[test]
    fn test_isolation_rejects_base_containing_cwd() {
        let cwd = std::env::current_dir().unwrap();
        let runtime = LocalRuntime::new(SandboxConfig {
            scratch_dir: cwd.parent().unwrap_or(&cwd).to_path_buf(),
            require_isolation: true,
        });
        assert!(runtime.check_isolation().is_err());

        let relaxed = LocalRuntime::new(SandboxConfig {
            scratch_dir: cwd,
            require_isolation: false,
        });
        assert!(relaxed.check_isolation().is_ok());
    }
}
