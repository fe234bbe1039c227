//! Boundary traits for the playground workspace.
//!
//! Traits are organized by the external collaborator they describe:
//! - `runtime`: sandbox runtime and its booted instance (filesystem, processes)
//! - `intelligence`: code-intelligence engine (extra libs, formatters, options)
//! - `terminal`: terminal emulator widget
//! - `store`: key-value project persistence

pub mod intelligence;
pub mod runtime;
pub mod store;
pub mod terminal;

pub use intelligence::*;
pub use runtime::*;
pub use store::*;
pub use terminal::*;
