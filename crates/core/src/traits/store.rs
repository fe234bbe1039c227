//! Project persistence traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Project;

/// Project as written to key-value persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedProject {
    pub project: Project,
    pub saved_at: DateTime<Utc>,
}

impl SavedProject {
    pub fn now(project: Project) -> Self {
        Self {
            project,
            saved_at: Utc::now(),
        }
    }
}

/// Key-value project storage keyed by project id.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Save a project, replacing any previous save with the same id.
    async fn save(&self, project: &SavedProject) -> Result<()>;

    /// Load a project by id.
    async fn load(&self, id: &str) -> Result<Option<SavedProject>>;

    /// List stored project ids.
    async fn list(&self) -> Result<Vec<String>>;

    /// Delete a project. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool>;
}
