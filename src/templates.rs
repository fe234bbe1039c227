//! Built-in starter projects and projects read from a host directory.

use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use playground_core::{Error, Project, Result};
use playground_store::PersistenceFilter;

/// Project opened when the CLI gets no directory.
pub const DEFAULT_PROJECT: &str = "vanilla-ts";

const VANILLA_PACKAGE_JSON: &str = r#"{
  "name": "vanilla-ts",
  "private": true,
  "type": "module",
  "scripts": {
    "build": "tsc",
    "dev": "tsc --watch"
  },
  "devDependencies": {
    "typescript": "^5.4.0"
  }
}
"#;

const VANILLA_TSCONFIG: &str = r#"{
  "compilerOptions": {
    "target": "ES2020",
    "module": "ESNext",
    "moduleResolution": "bundler",
    "strict": true,
    "outDir": "dist"
  },
  "include": ["src"]
}
"#;

const VANILLA_MAIN: &str = r##"import { greet } from "./greet";

const app = document.querySelector<HTMLDivElement>("#app");
if (app) {
  app.textContent = greet("playground");
}
"##;

const VANILLA_GREET: &str = r#"export function greet(name: string): string {
  return `Hello, ${name}!`;
}
"#;

const VANILLA_INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <title>Vanilla TypeScript</title>
  </head>
  <body>
    <div id="app"></div>
    <script type="module" src="/dist/main.js"></script>
  </body>
</html>
"#;

const NODE_PACKAGE_JSON: &str = r#"{
  "name": "node-script",
  "private": true,
  "type": "module",
  "scripts": {
    "start": "node index.js"
  }
}
"#;

const NODE_INDEX: &str = r#"import { sum } from "./lib/math.js";

console.log(`1 + 2 = ${sum(1, 2)}`);
"#;

const NODE_MATH: &str = r#"export function sum(a, b) {
  return a + b;
}
"#;

/// Starter projects shipped with the playground.
pub fn builtin_projects() -> Vec<Project> {
    vec![
        Project::new("vanilla-ts", "Vanilla TypeScript")
            .with_description("Browser TypeScript compiled with tsc")
            .with_initial_file("src/main.ts")
            .with_file("package.json", VANILLA_PACKAGE_JSON)
            .with_file("tsconfig.json", VANILLA_TSCONFIG)
            .with_file("index.html", VANILLA_INDEX_HTML)
            .with_file("src/main.ts", VANILLA_MAIN)
            .with_file("src/greet.ts", VANILLA_GREET),
        Project::new("node-script", "Node Script")
            .with_description("Plain ES module script run with node")
            .with_initial_file("index.js")
            .with_file("package.json", NODE_PACKAGE_JSON)
            .with_file("index.js", NODE_INDEX)
            .with_file("lib/math.js", NODE_MATH),
    ]
}

pub fn builtin_project(id: &str) -> Option<Project> {
    builtin_projects().into_iter().find(|p| p.id == id)
}

/// Read a project from a host directory.
///
/// Dot entries, excluded directories and non-UTF-8 files are skipped. The
/// project id and name come from the directory name; `package.json`'s
/// `main` field (or `index.*`) becomes the initial file.
pub async fn project_from_directory(dir: impl AsRef<Path>) -> Result<Project> {
    let dir = tokio::fs::canonicalize(dir.as_ref()).await.map_err(|e| {
        Error::operation(format!(
            "Cannot open project directory '{}': {}",
            dir.as_ref().display(),
            e
        ))
    })?;
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("project")
        .to_string();

    let filter = PersistenceFilter::default();
    let mut files = BTreeMap::new();
    read_host_dir(&dir, String::new(), &filter, &mut files).await?;
    if files.is_empty() {
        return Err(Error::operation(format!(
            "'{}' contains no project files",
            dir.display()
        )));
    }

    let initial = initial_file(&files);
    let mut project = Project::new(project_id(&name), name).with_initial_file(initial);
    project.files = files;
    tracing::info!(project_id = %project.id, files = project.files.len(), "Project read from directory");
    Ok(project)
}

fn project_id(name: &str) -> String {
    let id: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let id = id.trim_matches('-').to_string();
    if id.is_empty() {
        "project".to_string()
    } else {
        id
    }
}

fn initial_file(files: &BTreeMap<String, String>) -> String {
    let main = files
        .get("package.json")
        .and_then(|manifest| serde_json::from_str::<serde_json::Value>(manifest).ok())
        .and_then(|manifest| manifest.get("main")?.as_str().map(|s| s.trim_start_matches("./").to_string()))
        .filter(|main| files.contains_key(main));
    if let Some(main) = main {
        return main;
    }
    ["index.ts", "src/main.ts", "src/index.ts", "index.js", "src/index.js"]
        .iter()
        .find(|candidate| files.contains_key(**candidate))
        .map(|candidate| candidate.to_string())
        .unwrap_or_default()
}

fn read_host_dir<'a>(
    root: &'a Path,
    relative: String,
    filter: &'a PersistenceFilter,
    files: &'a mut BTreeMap<String, String>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let dir: PathBuf = if relative.is_empty() {
            root.to_path_buf()
        } else {
            root.join(&relative)
        };
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let path = if relative.is_empty() {
                name
            } else {
                format!("{}/{}", relative, name)
            };
            if filter.is_excluded(&path) {
                continue;
            }

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                read_host_dir(root, path, filter, files).await?;
            } else if file_type.is_file() {
                match tokio::fs::read_to_string(entry.path()).await {
                    Ok(content) => {
                        files.insert(path, content);
                    }
                    Err(e) => tracing::debug!(path = %path, error = %e, "Skipping unreadable file"),
                }
            }
        }
        Ok(())
    })
}
