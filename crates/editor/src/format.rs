//! Document formatters registered with the code-intelligence engine.

use std::sync::Arc;

use playground_core::{DocumentFormatter, Result};

/// Pretty-prints JSON documents with two-space indentation.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl DocumentFormatter for JsonFormatter {
    fn format(&self, text: &str) -> Result<String> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let mut formatted = serde_json::to_string_pretty(&value)?;
        formatted.push('\n');
        Ok(formatted)
    }
}

/// Layout-only formatter: expands leading tabs, strips trailing whitespace
/// and ends the document with exactly one newline.
#[derive(Debug, Clone, Copy)]
pub struct WhitespaceFormatter {
    pub tab_width: usize,
}

impl Default for WhitespaceFormatter {
    fn default() -> Self {
        Self { tab_width: 2 }
    }
}

impl DocumentFormatter for WhitespaceFormatter {
    fn format(&self, text: &str) -> Result<String> {
        let indent = " ".repeat(self.tab_width);
        let mut out = String::with_capacity(text.len());
        for line in text.lines() {
            let body = line.trim_start_matches('\t');
            let tabs = line.len() - body.len();
            out.push_str(&indent.repeat(tabs));
            out.push_str(body.trim_end());
            out.push('\n');
        }
        let trimmed = out.trim_end_matches('\n').len();
        out.truncate(trimmed);
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out)
    }
}

/// Formatters installed for each language mode.
pub fn default_formatters() -> Vec<(&'static str, Arc<dyn DocumentFormatter>)> {
    let whitespace: Arc<dyn DocumentFormatter> = Arc::new(WhitespaceFormatter::default());
    vec![
        ("json", Arc::new(JsonFormatter) as Arc<dyn DocumentFormatter>),
        ("typescript", whitespace.clone()),
        ("javascript", whitespace.clone()),
        ("css", whitespace.clone()),
        ("html", whitespace),
    ]
}
