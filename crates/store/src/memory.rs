//! In-memory project store using DashMap.

use async_trait::async_trait;
use dashmap::DashMap;

use playground_core::{ProjectStore, Result, SavedProject};

/// Process-lifetime project store.
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: DashMap<String, SavedProject>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn save(&self, project: &SavedProject) -> Result<()> {
        tracing::debug!(project_id = %project.project.id, "Saving project in memory");
        self.projects
            .insert(project.project.id.clone(), project.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<SavedProject>> {
        Ok(self.projects.get(id).map(|p| p.value().clone()))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.projects.iter().map(|p| p.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.projects.remove(id).is_some())
    }
}
