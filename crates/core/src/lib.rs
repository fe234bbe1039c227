#![deny(unused)]
//! Core types, traits, and error definitions for the playground workspace.
//!
//! This crate provides the building blocks shared by every component of the
//! workspace coordination layer: the snapshot data model, the boundary traits
//! for the sandbox runtime, code-intelligence engine and terminal, the path
//! policy, the timer abstraction and the pure file tree builder.

pub mod config;
pub mod error;
pub mod fs_policy;
pub mod mocks;
pub mod timer;
pub mod traits;
pub mod tree;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
