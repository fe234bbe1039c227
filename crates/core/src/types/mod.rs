//! Core types for the playground workspace.

pub mod fs;
pub mod process;
pub mod project;
pub mod snapshot;

pub use fs::*;
pub use process::*;
pub use project::*;
pub use snapshot::*;
