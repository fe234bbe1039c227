//! Snapshot filter applied before persistence.

use std::collections::BTreeMap;

use playground_core::config::StoreConfig;
use playground_core::FileSnapshot;

/// Drops files under generated or installed directories.
#[derive(Debug, Clone)]
pub struct PersistenceFilter {
    prefixes: Vec<String>,
}

impl PersistenceFilter {
    /// Build from path prefixes. A prefix without a trailing slash is
    /// treated as a directory name.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(Into::into)
            .map(|p: String| p.trim_start_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .map(|p| if p.ends_with('/') { p } else { format!("{}/", p) })
            .collect();
        Self { prefixes }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.exclude_prefixes.iter().cloned())
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Whether `path` lies under an excluded prefix, or is the excluded
    /// directory itself.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            path.starts_with(prefix.as_str()) || path == prefix.trim_end_matches('/')
        })
    }

    /// Filtered copy of `snapshot`.
    pub fn apply(&self, snapshot: &FileSnapshot) -> FileSnapshot {
        let files: BTreeMap<String, String> = snapshot
            .files
            .iter()
            .filter(|(path, _)| !self.is_excluded(path))
            .map(|(path, content)| (path.clone(), content.clone()))
            .collect();
        let directories = snapshot
            .directories
            .iter()
            .filter(|dir| !self.is_excluded(dir))
            .cloned()
            .collect();

        let dropped = snapshot.files.len() - files.len();
        if dropped > 0 {
            tracing::debug!(dropped, kept = files.len(), "Filtered snapshot for persistence");
        }
        FileSnapshot::new(files, directories)
    }
}

impl Default for PersistenceFilter {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}
