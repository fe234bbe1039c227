//! Archive and clipboard exporters.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use playground_core::{Error, Result};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Header line written before each file in clipboard text.
pub const CLIPBOARD_HEADER_PREFIX: &str = "// ===== ";
const CLIPBOARD_HEADER_SUFFIX: &str = " =====";

/// Zip archive bytes with one deflated entry per file, in path order.
pub fn export_archive(files: &BTreeMap<String, String>) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for (path, content) in files {
        writer
            .start_file(path.as_str(), options)
            .map_err(|e| Error::storage(format!("Failed to add '{}' to archive: {}", path, e)))?;
        writer
            .write_all(content.as_bytes())
            .map_err(|e| Error::storage(format!("Failed to write '{}' to archive: {}", path, e)))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| Error::storage(format!("Failed to finish archive: {}", e)))?;
    let bytes = cursor.into_inner();
    tracing::info!(files = files.len(), bytes = bytes.len(), "Archive exported");
    Ok(bytes)
}

/// Concatenation of every file, each preceded by a `// ===== <path> =====`
/// header line.
pub fn to_clipboard_text(files: &BTreeMap<String, String>) -> String {
    let mut text = String::new();
    for (path, content) in files {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(CLIPBOARD_HEADER_PREFIX);
        text.push_str(path);
        text.push_str(CLIPBOARD_HEADER_SUFFIX);
        text.push('\n');
        text.push_str(content);
        if !content.is_empty() && !content.ends_with('\n') {
            text.push('\n');
        }
    }
    text
}
