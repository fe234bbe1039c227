//! Terminal emulator over the process's own stdin and stdout.

use std::io::Write;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use playground_core::{TerminalEmulator, TerminalSize};

/// Line-oriented terminal on stdio.
///
/// The size comes from `COLUMNS`/`LINES` when set, else the fallback.
#[derive(Debug, Clone, Copy)]
pub struct StdioTerminal {
    fallback: TerminalSize,
}

impl StdioTerminal {
    pub fn new(fallback: TerminalSize) -> Self {
        Self { fallback }
    }
}

impl Default for StdioTerminal {
    fn default() -> Self {
        Self::new(TerminalSize::default())
    }
}

fn env_dimension(name: &str) -> Option<u16> {
    std::env::var(name).ok()?.trim().parse().ok().filter(|n| *n > 0)
}

impl TerminalEmulator for StdioTerminal {
    fn write(&self, data: &str) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(data.as_bytes()).and_then(|_| stdout.flush()) {
            tracing::debug!(error = %e, "stdout closed");
        }
    }

    fn on_data(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stdin = tokio::io::stdin();
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let data = String::from_utf8_lossy(&buf[..n]).into_owned();
                        if tx.send(data).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "stdin closed");
                        break;
                    }
                }
            }
        });
        rx
    }

    fn fit(&self) -> TerminalSize {
        TerminalSize {
            cols: env_dimension("COLUMNS").unwrap_or(self.fallback.cols),
            rows: env_dimension("LINES").unwrap_or(self.fallback.rows),
        }
    }
}
