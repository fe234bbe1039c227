//! Terminal emulator boundary.

use tokio::sync::mpsc;

use crate::types::TerminalSize;

/// Terminal widget the shell is attached to.
pub trait TerminalEmulator: Send + Sync {
    /// Render output.
    fn write(&self, data: &str);

    /// Stream of keystrokes typed into the terminal.
    fn on_data(&self) -> mpsc::UnboundedReceiver<String>;

    /// Fit the terminal to its container and report the resulting size.
    fn fit(&self) -> TerminalSize;
}
