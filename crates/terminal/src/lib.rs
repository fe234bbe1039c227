#![deny(unused)]
//! Terminal bridge between a terminal emulator and the sandbox shell.

pub mod bridge;
pub mod stdio;

pub use bridge::{InstallGate, InstallHook, ShellWriter, TerminalBridge};
pub use stdio::StdioTerminal;
