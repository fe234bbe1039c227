use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::FileSnapshot;

/// Playground project: the seed files mounted into the sandbox at open time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// File opened in the editor when the project is mounted.
    pub initial_file: String,
    pub files: BTreeMap<String, String>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            initial_file: String::new(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_initial_file(mut self, path: impl Into<String>) -> Self {
        self.initial_file = path.into();
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Seed snapshot for mounting.
    pub fn snapshot(&self) -> FileSnapshot {
        FileSnapshot::from_files(self.files.clone())
    }

    /// The initial file if it exists, else the first file in path order.
    pub fn entry_file(&self) -> Option<&str> {
        if self.files.contains_key(&self.initial_file) {
            Some(self.initial_file.as_str())
        } else {
            self.files.keys().next().map(String::as_str)
        }
    }
}
