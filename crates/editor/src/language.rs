//! Language mode resolution.

use playground_core::fs_policy;

/// Mode used when an extension is not in the table.
pub const PLAIN_TEXT: &str = "plaintext";

/// Extension to editor language mode.
const LANGUAGES: &[(&str, &str)] = &[
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("mts", "typescript"),
    ("cts", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("json", "json"),
    ("html", "html"),
    ("htm", "html"),
    ("css", "css"),
    ("scss", "scss"),
    ("less", "less"),
    ("md", "markdown"),
    ("mdx", "markdown"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("xml", "xml"),
    ("svg", "xml"),
    ("py", "python"),
    ("rs", "rust"),
    ("sh", "shell"),
    ("sql", "sql"),
];

/// Editor language mode for a file path.
pub fn language_for_path(path: &str) -> &'static str {
    let name = fs_policy::file_name(path);
    let extension = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext,
        _ => return PLAIN_TEXT,
    };
    LANGUAGES
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|(_, language)| *language)
        .unwrap_or(PLAIN_TEXT)
}
