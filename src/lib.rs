#![deny(unused)]
//! Playground workspace coordination layer.
//!
//! Ties the sandbox gateway, the filesystem synchronizer, the editor session,
//! the type loader and the persistence boundary together behind one
//! [`Workspace`] that opens, edits, saves and closes projects.

pub mod templates;
pub mod workspace;

pub use templates::{builtin_project, builtin_projects, project_from_directory, DEFAULT_PROJECT};
pub use workspace::{Workspace, WorkspaceContext};
