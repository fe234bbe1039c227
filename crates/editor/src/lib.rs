#![deny(unused)]
//! Editor-side state of the playground.
//!
//! - [`EditorSession`]: the single open document, debounced commits to the
//!   sandbox and the guard against stale watcher overwrites.
//! - [`TypeLoader`]: discovery and throttled registration of type
//!   declarations with the code-intelligence engine.
//! - [`HeadlessIntelligence`]: an in-process engine for hosts without a UI.

pub mod format;
pub mod headless;
pub mod intellisense;
pub mod language;
pub mod session;

pub use format::{default_formatters, JsonFormatter, WhitespaceFormatter};
pub use headless::HeadlessIntelligence;
pub use intellisense::{LoadReport, TypeLoader};
pub use language::{language_for_path, PLAIN_TEXT};
pub use session::EditorSession;
