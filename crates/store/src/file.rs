use async_trait::async_trait;
use std::path::PathBuf;

use playground_core::config::StoreConfig;
use playground_core::{Error, ProjectStore, Result, SavedProject};

const EXTENSION: &str = "json";

/// Persistent project storage: one JSON document per project id.
pub struct FileProjectStore {
    dir: PathBuf,
}

impl FileProjectStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.data_dir.clone())
    }

    fn document_path(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(Error::storage(format!("Invalid project id '{}'", id)));
        }
        Ok(self.dir.join(format!("{}.{}", id, EXTENSION)))
    }
}

#[async_trait]
impl ProjectStore for FileProjectStore {
    async fn save(&self, project: &SavedProject) -> Result<()> {
        let path = self.document_path(&project.project.id)?;
        let content = serde_json::to_string_pretty(project)
            .map_err(|e| Error::storage(format!("Failed to serialize project: {}", e)))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::storage(format!("Failed to create project directory: {}", e)))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| Error::storage(format!("Failed to write project file: {}", e)))?;
        tracing::info!(
            project_id = %project.project.id,
            files = project.project.files.len(),
            path = %path.display(),
            "Project saved"
        );
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<SavedProject>> {
        let path = self.document_path(id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::storage(format!("Failed to read project file: {}", e)));
            }
        };
        let project = serde_json::from_str(&content)
            .map_err(|e| Error::storage(format!("Failed to parse project file: {}", e)))?;
        Ok(Some(project))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::storage(format!("Failed to list projects: {}", e)));
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage(format!("Failed to list projects: {}", e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let path = self.document_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::storage(format!("Failed to delete project file: {}", e))),
        }
    }
}

impl std::fmt::Debug for FileProjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileProjectStore")
            .field("dir", &self.dir)
            .finish()
    }
}
