#![deny(unused)]
//! Sandbox gateway and virtual filesystem synchronization.
//!
//! This crate owns everything that talks to the sandboxed execution
//! environment: the lifecycle of its single instance, full reads and bulk
//! mounts of its filesystem, the change-watch loop, and the structural
//! file operations.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  Workspace coordinator                 │
//! │    ↓ get_instance / reset / dispose    │
//! ├────────────────────────────────────────┤
//! │  WorkspaceHandle (gateway)             │
//! │    Uninitialized → Booting → Ready     │
//! ├────────────────────────────────────────┤
//! │  sync: read_all_files, mount_project,  │
//! │        watch_file_system               │
//! │  ops:  create / delete / rename / move │
//! ├────────────────────────────────────────┤
//! │  SandboxInstance (LocalSandbox, ...)   │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use playground_sandbox::{LocalRuntime, WorkspaceHandle, sync};
//!
//! let handle = WorkspaceHandle::new(Arc::new(LocalRuntime::new(config.sandbox)));
//! let instance = handle.get_instance().await?;
//! sync::mount_project(&*instance, &project.files).await?;
//! let snapshot = sync::read_all_files(&*instance).await;
//! ```

pub mod gateway;
pub mod local;
pub mod ops;
pub mod sync;

pub use gateway::{clear_file_system, HandleState, WorkspaceHandle};
pub use local::{LocalRuntime, LocalSandbox};
pub use sync::{
    convert_files_to_file_tree, mount_project, read_all_files, read_all_files_skipping,
    watch_file_system, IgnorePredicate, SnapshotSink, WatchOptions, WatchSubscription,
};
