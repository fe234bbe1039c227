#![deny(unused)]
//! Persistence boundary for the playground workspace.
//!
//! Everything that leaves the workspace for storage passes through here:
//! snapshots are filtered of generated directories first, then saved to a
//! [`ProjectStore`](playground_core::ProjectStore), exported as a zip
//! archive, or serialized for the clipboard.

pub mod archive;
pub mod file;
pub mod filter;
pub mod memory;

pub use archive::{export_archive, to_clipboard_text, CLIPBOARD_HEADER_PREFIX};
pub use file::FileProjectStore;
pub use filter::PersistenceFilter;
pub use memory::InMemoryProjectStore;
