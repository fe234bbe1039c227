//! Error types for the playground workspace.

use thiserror::Error;

/// Result type alias using the playground's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the playground workspace.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Runtime Lifecycle Errors
    // =========================================================================
    #[error("Sandbox boot precondition failed: {0}")]
    BootPrecondition(String),

    #[error("Sandbox boot failed: {0}")]
    BootFailure(String),

    #[error("Workspace handle has been disposed")]
    Disposed,

    // =========================================================================
    // Filesystem Errors
    // =========================================================================
    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("File operation failed on '{path}': {message}")]
    FileOperation { path: String, message: String },

    #[error("Watch setup failed: {0}")]
    WatchSetup(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // =========================================================================
    // Code Intelligence Errors
    // =========================================================================
    #[error("Type definition load failed for '{path}': {message}")]
    TypeLoad { path: String, message: String },

    // =========================================================================
    // Process & Terminal Errors
    // =========================================================================
    #[error("Process error: {0}")]
    Process(String),

    #[error("Terminal error: {0}")]
    Terminal(String),

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a boot precondition error.
    pub fn boot_precondition(msg: impl Into<String>) -> Self {
        Self::BootPrecondition(msg.into())
    }

    /// Create a boot failure error.
    pub fn boot_failure(msg: impl Into<String>) -> Self {
        Self::BootFailure(msg.into())
    }

    /// Create a structural operation error.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Create a file operation error for a single path.
    pub fn file_operation(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::FileOperation {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a watch setup error.
    pub fn watch_setup(msg: impl Into<String>) -> Self {
        Self::WatchSetup(msg.into())
    }

    /// Create an invalid path error.
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Create a type load error.
    pub fn type_load(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::TypeLoad {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a process error.
    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    /// Create a terminal error.
    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether a later retry of the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BootFailure(_) | Self::FileOperation { .. })
    }
}
