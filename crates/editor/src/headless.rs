//! In-process code-intelligence engine.
//!
//! Keeps registered libraries, compiler options, theme and formatters in
//! memory. Used where no real editor engine is attached, such as the CLI.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use playground_core::{
    CodeIntelligence, CompilerOptions, Disposable, DocumentFormatter, Error, Result,
};

#[derive(Debug, Clone)]
struct ExtraLib {
    virtual_path: String,
    content: String,
}

#[derive(Default)]
struct EngineState {
    libs: DashMap<u64, ExtraLib>,
    formatters: DashMap<String, Arc<dyn DocumentFormatter>>,
    compiler_options: RwLock<Option<CompilerOptions>>,
    theme: RwLock<Option<String>>,
    next_id: AtomicU64,
}

/// Engine that records state without analysing anything.
#[derive(Clone, Default)]
pub struct HeadlessIntelligence {
    state: Arc<EngineState>,
}

struct LibHandle {
    id: u64,
    state: Arc<EngineState>,
}

impl Disposable for LibHandle {
    fn dispose(self: Box<Self>) {
        self.state.libs.remove(&self.id);
    }
}

impl HeadlessIntelligence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live library registrations.
    pub fn lib_count(&self) -> usize {
        self.state.libs.len()
    }

    /// Registered virtual paths, sorted.
    pub fn lib_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .state
            .libs
            .iter()
            .map(|e| e.value().virtual_path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Total bytes of registered declaration content.
    pub fn lib_bytes(&self) -> usize {
        self.state.libs.iter().map(|e| e.value().content.len()).sum()
    }

    pub fn compiler_options(&self) -> Option<CompilerOptions> {
        self.state.compiler_options.read().clone()
    }

    pub fn theme(&self) -> Option<String> {
        self.state.theme.read().clone()
    }

    /// Format `text` with the formatter registered for `language`.
    pub fn format(&self, language: &str, text: &str) -> Result<String> {
        let formatter = self
            .state
            .formatters
            .get(language)
            .map(|f| f.value().clone())
            .ok_or_else(|| Error::operation(format!("no formatter registered for '{}'", language)))?;
        formatter.format(text)
    }
}

impl CodeIntelligence for HeadlessIntelligence {
    fn add_extra_lib(&self, content: &str, virtual_path: &str) -> Result<Box<dyn Disposable>> {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state.libs.insert(
            id,
            ExtraLib {
                virtual_path: virtual_path.to_string(),
                content: content.to_string(),
            },
        );
        Ok(Box::new(LibHandle {
            id,
            state: self.state.clone(),
        }))
    }

    fn register_document_formatting_provider(
        &self,
        language: &str,
        provider: Arc<dyn DocumentFormatter>,
    ) -> Result<()> {
        self.state.formatters.insert(language.to_string(), provider);
        Ok(())
    }

    fn set_compiler_options(&self, options: &CompilerOptions) -> Result<()> {
        *self.state.compiler_options.write() = Some(options.clone());
        Ok(())
    }

    fn set_theme(&self, theme: &str) -> Result<()> {
        *self.state.theme.write() = Some(theme.to_string());
        Ok(())
    }
}
