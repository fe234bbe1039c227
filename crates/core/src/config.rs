use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub sandbox: SandboxConfig,
    pub sync: SyncConfig,
    pub editor: EditorConfig,
    pub intellisense: IntellisenseConfig,
    pub terminal: TerminalConfig,
    pub store: StoreConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SandboxConfig {
    /// Base directory under which the local runtime creates one scratch root per boot.
    pub scratch_dir: PathBuf,
    /// Refuse to boot when the host does not provide isolation.
    pub require_isolation: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("playground-sandbox"),
            require_isolation: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub watch_cooldown_ms: u64,
    /// Directory names skipped by the full filesystem walk.
    pub skip_dirs: Vec<String>,
}

impl SyncConfig {
    pub fn watch_cooldown(&self) -> Duration {
        Duration::from_millis(self.watch_cooldown_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            watch_cooldown_ms: 300,
            skip_dirs: vec!["node_modules".into()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EditorConfig {
    pub commit_debounce_ms: u64,
}

impl EditorConfig {
    pub fn commit_debounce(&self) -> Duration {
        Duration::from_millis(self.commit_debounce_ms)
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            commit_debounce_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IntellisenseConfig {
    /// Package root scanned for declarations and manifests.
    pub types_root: String,
    /// Manifest file watched to trigger reloads.
    pub manifest_file: String,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
}

impl IntellisenseConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl Default for IntellisenseConfig {
    fn default() -> Self {
        Self {
            types_root: "node_modules".into(),
            manifest_file: "package.json".into(),
            batch_size: 50,
            batch_delay_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TerminalConfig {
    pub install_command: String,
    pub install_args: Vec<String>,
    pub shell_command: String,
    pub shell_args: Vec<String>,
    pub cols: u16,
    pub rows: u16,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            install_command: "npm".into(),
            install_args: vec!["install".into()],
            shell_command: "sh".into(),
            shell_args: vec!["-i".into()],
            cols: 80,
            rows: 24,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// Path prefixes excluded from anything handed to persistence.
    pub exclude_prefixes: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".playground/projects"),
            exclude_prefixes: vec![
                "node_modules/".into(),
                "dist/".into(),
                "build/".into(),
                ".next/".into(),
                ".cache/".into(),
                "coverage/".into(),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_filter: String,
    pub json_logs: bool,
    pub prometheus: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: "info,playground=debug".into(),
            json_logs: false,
            prometheus: false,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("PLAYGROUND_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map APP__SYNC__WATCH_COOLDOWN_MS=500 to sync.watch_cooldown_ms
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
