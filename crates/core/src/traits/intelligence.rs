//! Code-intelligence engine boundary.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

/// Handle that removes a registration from the engine.
pub trait Disposable: Send + Sync {
    fn dispose(self: Box<Self>);
}

/// Whole-document formatter registered for one language.
pub trait DocumentFormatter: Send + Sync {
    fn format(&self, text: &str) -> Result<String>;
}

/// Compiler settings handed to the engine's type checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    pub target: String,
    pub module: String,
    pub module_resolution: String,
    pub jsx: String,
    pub strict: bool,
    pub allow_js: bool,
    pub es_module_interop: bool,
    pub skip_lib_check: bool,
    pub type_roots: Vec<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            target: "ESNext".into(),
            module: "ESNext".into(),
            module_resolution: "NodeJs".into(),
            jsx: "react-jsx".into(),
            strict: true,
            allow_js: true,
            es_module_interop: true,
            skip_lib_check: true,
            type_roots: vec!["node_modules/@types".into()],
        }
    }
}

/// Static-analysis engine behind the editor.
pub trait CodeIntelligence: Send + Sync {
    /// Register declaration content at a virtual path.
    fn add_extra_lib(&self, content: &str, virtual_path: &str) -> Result<Box<dyn Disposable>>;

    fn register_document_formatting_provider(
        &self,
        language: &str,
        provider: Arc<dyn DocumentFormatter>,
    ) -> Result<()>;

    fn set_compiler_options(&self, options: &CompilerOptions) -> Result<()>;

    fn set_theme(&self, theme: &str) -> Result<()>;
}
