//! Sandbox runtime gateway.
//!
//! [`WorkspaceHandle`] owns the single sandbox instance of a workspace and
//! moves it through an explicit lifecycle:
//!
//! ```text
//! Uninitialized ──get_instance──▶ Booting ──ok──▶ Ready
//!       ▲                            │              │
//!       └──────── failure / reset ───┴──── reset ───┘
//!
//! any state ──dispose──▶ Disposed
//! ```
//!
//! Concurrent callers during `Booting` all await the same shared boot, so
//! the runtime is never booted twice for one handle.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;

use playground_core::{Error, Result, SandboxInstance, SandboxRuntime};

type BootOutcome = std::result::Result<Arc<dyn SandboxInstance>, String>;
type SharedBoot = Shared<BoxFuture<'static, BootOutcome>>;

/// Observable lifecycle phase of a [`WorkspaceHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Uninitialized,
    Booting,
    Ready,
    Disposed,
}

enum Phase {
    Uninitialized,
    Booting {
        generation: u64,
        boot: SharedBoot,
    },
    Ready {
        generation: u64,
        instance: Arc<dyn SandboxInstance>,
    },
    Disposed,
}

/// Lifecycle-managed handle to the workspace's sandbox instance.
pub struct WorkspaceHandle {
    runtime: Arc<dyn SandboxRuntime>,
    phase: Mutex<Phase>,
    generation: Mutex<u64>,
}

impl WorkspaceHandle {
    /// Create a handle; nothing boots until the first `get_instance`.
    pub fn new(runtime: Arc<dyn SandboxRuntime>) -> Self {
        Self {
            runtime,
            phase: Mutex::new(Phase::Uninitialized),
            generation: Mutex::new(0),
        }
    }

    /// Current lifecycle phase.
    pub fn state(&self) -> HandleState {
        match &*self.phase.lock() {
            Phase::Uninitialized => HandleState::Uninitialized,
            Phase::Booting { .. } => HandleState::Booting,
            Phase::Ready { .. } => HandleState::Ready,
            Phase::Disposed => HandleState::Disposed,
        }
    }

    /// The ready instance, without booting.
    pub fn instance(&self) -> Option<Arc<dyn SandboxInstance>> {
        match &*self.phase.lock() {
            Phase::Ready { instance, .. } => Some(instance.clone()),
            _ => None,
        }
    }

    /// Get the ready instance, booting it if needed.
    ///
    /// Fails with `BootPrecondition` before any boot when the host lacks
    /// isolation, and with `BootFailure` when the boot itself fails; in the
    /// latter case the handle returns to `Uninitialized` so a later call
    /// retries cleanly.
    pub async fn get_instance(&self) -> Result<Arc<dyn SandboxInstance>> {
        let (generation, boot) = {
            let mut phase = self.phase.lock();
            match &*phase {
                Phase::Ready { instance, .. } => return Ok(instance.clone()),
                Phase::Disposed => return Err(Error::Disposed),
                Phase::Booting { generation, boot } => (*generation, boot.clone()),
                Phase::Uninitialized => {
                    self.runtime.check_isolation().map_err(|e| match e {
                        Error::BootPrecondition(_) => e,
                        other => Error::boot_precondition(other.to_string()),
                    })?;

                    let generation = self.next_generation();
                    let runtime = self.runtime.clone();
                    let boot = async move { runtime.boot().await.map_err(|e| e.to_string()) }
                        .boxed()
                        .shared();
                    *phase = Phase::Booting {
                        generation,
                        boot: boot.clone(),
                    };
                    tracing::info!(generation, "Booting sandbox runtime");
                    (generation, boot)
                }
            }
        };

        let outcome = boot.await;

        let superseded = {
            let mut phase = self.phase.lock();
            let current = match &*phase {
                Phase::Booting { generation: g, .. } | Phase::Ready { generation: g, .. } => {
                    *g == generation
                }
                _ => false,
            };
            if current {
                if let Phase::Booting { .. } = &*phase {
                    *phase = match &outcome {
                        Ok(instance) => {
                            tracing::info!(
                                generation,
                                instance = instance.id(),
                                "Sandbox runtime ready"
                            );
                            Phase::Ready {
                                generation,
                                instance: instance.clone(),
                            }
                        }
                        Err(message) => {
                            tracing::error!(generation, error = %message, "Sandbox boot failed");
                            Phase::Uninitialized
                        }
                    };
                }
            }
            !current
        };

        match outcome {
            Ok(instance) if !superseded => Ok(instance),
            Ok(instance) => {
                tracing::warn!(
                    generation,
                    instance = instance.id(),
                    "Sandbox boot completed after reset; discarding instance"
                );
                if let Err(e) = instance.teardown().await {
                    tracing::warn!(error = %e, "Failed to tear down discarded sandbox instance");
                }
                Err(Error::boot_failure("sandbox boot was superseded by a reset"))
            }
            Err(message) => Err(Error::boot_failure(message)),
        }
    }

    /// Forget the current instance and any in-flight boot.
    ///
    /// Returns the previously ready instance so the caller can tear it down.
    /// A disposed handle stays disposed.
    pub fn reset_instance(&self) -> Option<Arc<dyn SandboxInstance>> {
        let mut phase = self.phase.lock();
        if let Phase::Disposed = &*phase {
            return None;
        }
        let previous = std::mem::replace(&mut *phase, Phase::Uninitialized);
        tracing::debug!("Sandbox handle reset");
        match previous {
            Phase::Ready { instance, .. } => Some(instance),
            _ => None,
        }
    }

    /// Tear down the instance and refuse any further use of this handle.
    pub async fn dispose(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.phase.lock(), Phase::Disposed);
        if let Phase::Ready { instance, .. } = previous {
            instance.teardown().await?;
            tracing::info!(instance = instance.id(), "Sandbox instance disposed");
        }
        Ok(())
    }

    fn next_generation(&self) -> u64 {
        let mut generation = self.generation.lock();
        *generation += 1;
        *generation
    }
}

impl std::fmt::Debug for WorkspaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// Remove every top-level entry of the sandbox filesystem.
///
/// Best effort: a failure to remove one entry is logged and the loop moves on.
/// Returns how many entries were removed.
pub async fn clear_file_system(instance: &dyn SandboxInstance) -> Result<usize> {
    let entries = instance.read_dir("").await?;
    let mut removed = 0;
    for entry in entries {
        match instance.rm(&entry.name, true).await {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(entry = %entry.name, error = %e, "Failed to remove sandbox entry");
            }
        }
    }
    tracing::debug!(removed, instance = instance.id(), "Sandbox filesystem cleared");
    Ok(removed)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use playground_core::mocks::MemoryRuntime;
    use std::time::Duration;

    fn handle_with(runtime: Arc<MemoryRuntime>) -> Arc<WorkspaceHandle> {
        Arc::new(WorkspaceHandle::new(runtime))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_boot() {
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.set_boot_delay(Duration::from_millis(50));
        let handle = handle_with(runtime.clone());

        let calls = (0..10).map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.get_instance().await.unwrap().id().to_string() })
        });
        let ids: Vec<String> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(runtime.boot_count(), 1);
        assert!(ids.iter().all(|id| id == &ids[0]));
        assert_eq!(handle.state(), HandleState::Ready);
    }

    #[tokio::test]
    async fn test_precondition_failure_never_boots() {
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.set_isolated(false);
        let handle = handle_with(runtime.clone());

        let err = handle.get_instance().await.err().unwrap();
        assert!(matches!(err, Error::BootPrecondition(_)));
        assert_eq!(runtime.boot_count(), 0);
        assert_eq!(handle.state(), HandleState::Uninitialized);
    }

    #[tokio::test]
    async fn test_boot_failure_resets_for_retry() {
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.fail_next_boots(1);
        let handle = handle_with(runtime.clone());

        let err = handle.get_instance().await.err().unwrap();
        assert!(matches!(err, Error::BootFailure(_)));
        assert_eq!(handle.state(), HandleState::Uninitialized);

        let instance = handle.get_instance().await.unwrap();
        assert_eq!(instance.id(), "memory-sandbox-2");
        assert_eq!(runtime.boot_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_boot_failure() {
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.set_boot_delay(Duration::from_millis(20));
        runtime.fail_next_boots(1);
        let handle = handle_with(runtime.clone());

        let (a, b) = tokio::join!(handle.get_instance(), handle.get_instance());
        assert!(matches!(a, Err(Error::BootFailure(_))));
        assert!(matches!(b, Err(Error::BootFailure(_))));
        assert_eq!(runtime.boot_count(), 1);
    }

    #[tokio::test]
    async fn test_reset_returns_previous_instance() {
        let runtime = Arc::new(MemoryRuntime::new());
        let handle = handle_with(runtime.clone());

        let first = handle.get_instance().await.unwrap();
        let previous = handle.reset_instance().unwrap();
        assert_eq!(previous.id(), first.id());
        assert_eq!(handle.state(), HandleState::Uninitialized);

        let second = handle.get_instance().await.unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_late_boot() {
        let runtime = Arc::new(MemoryRuntime::new());
        runtime.set_boot_delay(Duration::from_millis(100));
        let handle = handle_with(runtime.clone());

        let pending = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.get_instance().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.state(), HandleState::Booting);
        assert!(handle.reset_instance().is_none());

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(Error::BootFailure(_))));
        assert_eq!(handle.state(), HandleState::Uninitialized);
        assert!(runtime.last_instance().unwrap().is_torn_down());
    }

    #[tokio::test]
    async fn test_dispose_is_terminal() {
        let runtime = Arc::new(MemoryRuntime::new());
        let handle = handle_with(runtime.clone());
        handle.get_instance().await.unwrap();

        handle.dispose().await.unwrap();
        assert_eq!(handle.state(), HandleState::Disposed);
        assert!(runtime.last_instance().unwrap().is_torn_down());
        assert!(matches!(handle.get_instance().await, Err(Error::Disposed)));
        assert!(handle.reset_instance().is_none());
        assert_eq!(handle.state(), HandleState::Disposed);
    }

    #[tokio::test]
    async fn test_clear_file_system_is_best_effort() {
        let sandbox = playground_core::mocks::MemorySandbox::new();
        sandbox.seed_file("a.ts", "a");
        sandbox.seed_file("b/c.ts", "c");
        sandbox.seed_dir("d");
        sandbox.fail_removes_of("b");

        let removed = clear_file_system(&sandbox).await.unwrap();
        assert_eq!(removed, 2);
        assert!(sandbox.file("a.ts").is_none());
        assert!(!sandbox.has_dir("d"));
        assert_eq!(sandbox.file("b/c.ts").as_deref(), Some("c"));
    }
}
