//! Structural filesystem operations.
//!
//! Each operation is a sequence of primitive sandbox calls. Any failing step
//! surfaces as `Error::Operation`; completed steps are not rolled back.
//! Directory rename and move copy every file first and delete the source
//! last, so a failure part-way leaves the source intact.

use futures::future::BoxFuture;

use playground_core::{fs_policy, EntryKind, Error, Result, SandboxInstance};

fn failed(action: &str, path: &str, cause: Error) -> Error {
    Error::operation(format!("{} '{}' failed: {}", action, path, cause))
}

/// Kind of the entry at `path`, if it exists.
pub async fn entry_kind(instance: &dyn SandboxInstance, path: &str) -> Result<Option<EntryKind>> {
    if path.is_empty() {
        return Ok(Some(EntryKind::Directory));
    }
    let name = fs_policy::file_name(path);
    let entries = match instance.read_dir(fs_policy::parent(path)).await {
        Ok(entries) => entries,
        Err(_) => return Ok(None),
    };
    Ok(entries.into_iter().find(|e| e.name == name).map(|e| e.kind))
}

async fn ensure_parent(instance: &dyn SandboxInstance, path: &str) -> Result<()> {
    let parent = fs_policy::parent(path);
    if !parent.is_empty() {
        instance.mkdir(parent, true).await?;
    }
    Ok(())
}

/// Create a file, creating missing parent directories. Returns the normalized path.
pub async fn create_file(
    instance: &dyn SandboxInstance,
    path: &str,
    content: &str,
) -> Result<String> {
    let path = fs_policy::normalize_entry_path(path)?;
    if entry_kind(instance, &path).await?.is_some() {
        return Err(Error::operation(format!("'{}' already exists", path)));
    }
    ensure_parent(instance, &path)
        .await
        .map_err(|e| failed("create file", &path, e))?;
    instance
        .write_file(&path, content)
        .await
        .map_err(|e| failed("create file", &path, e))?;
    tracing::info!(path = %path, "File created");
    Ok(path)
}

/// Create a directory and any missing parents. Returns the normalized path.
pub async fn create_directory(instance: &dyn SandboxInstance, path: &str) -> Result<String> {
    let path = fs_policy::normalize_entry_path(path)?;
    if let Some(EntryKind::File) = entry_kind(instance, &path).await? {
        return Err(Error::operation(format!("'{}' is an existing file", path)));
    }
    instance
        .mkdir(&path, true)
        .await
        .map_err(|e| failed("create directory", &path, e))?;
    tracing::info!(path = %path, "Directory created");
    Ok(path)
}

/// Delete a file or a directory with everything below it.
pub async fn delete(instance: &dyn SandboxInstance, path: &str) -> Result<()> {
    let path = fs_policy::normalize_entry_path(path)?;
    instance
        .rm(&path, true)
        .await
        .map_err(|e| failed("delete", &path, e))?;
    tracing::info!(path = %path, "Entry deleted");
    Ok(())
}

/// Give an entry a new name in the same directory. Returns the new path.
pub async fn rename(instance: &dyn SandboxInstance, path: &str, new_name: &str) -> Result<String> {
    let path = fs_policy::normalize_entry_path(path)?;
    if new_name.is_empty() || new_name.contains('/') || new_name == "." || new_name == ".." {
        return Err(Error::operation(format!("'{}' is not a valid name", new_name)));
    }
    let target = fs_policy::join(fs_policy::parent(&path), new_name);
    relocate(instance, &path, &target).await?;
    Ok(target)
}

/// Move an entry into `target_dir` (`""` is the root). Returns the new path.
pub async fn move_entry(
    instance: &dyn SandboxInstance,
    path: &str,
    target_dir: &str,
) -> Result<String> {
    let path = fs_policy::normalize_entry_path(path)?;
    let target_dir = fs_policy::normalize_path(target_dir)?;
    if let Some(EntryKind::File) = entry_kind(instance, &target_dir).await? {
        return Err(Error::operation(format!("'{}' is not a directory", target_dir)));
    }
    let target = fs_policy::join(&target_dir, fs_policy::file_name(&path));
    relocate(instance, &path, &target).await?;
    Ok(target)
}

async fn relocate(instance: &dyn SandboxInstance, from: &str, to: &str) -> Result<()> {
    if from == to {
        return Ok(());
    }
    if fs_policy::is_within(to, from) {
        return Err(Error::operation(format!(
            "cannot move '{}' into itself",
            from
        )));
    }
    let kind = entry_kind(instance, from)
        .await?
        .ok_or_else(|| Error::operation(format!("'{}' does not exist", from)))?;
    if entry_kind(instance, to).await?.is_some() {
        return Err(Error::operation(format!("'{}' already exists", to)));
    }

    match kind {
        EntryKind::File => relocate_file(instance, from, to).await?,
        EntryKind::Directory => relocate_directory(instance, from, to).await?,
    }
    tracing::info!(from = %from, to = %to, "Entry moved");
    Ok(())
}

async fn relocate_file(instance: &dyn SandboxInstance, from: &str, to: &str) -> Result<()> {
    let content = instance
        .read_file(from)
        .await
        .map_err(|e| failed("read", from, e))?;
    ensure_parent(instance, to)
        .await
        .map_err(|e| failed("create parent of", to, e))?;
    instance
        .write_file(to, &content)
        .await
        .map_err(|e| failed("write", to, e))?;
    instance
        .rm(from, false)
        .await
        .map_err(|e| failed("remove", from, e))
}

async fn relocate_directory(instance: &dyn SandboxInstance, from: &str, to: &str) -> Result<()> {
    let (dirs, files) = list_tree(instance, from.to_string())
        .await
        .map_err(|e| failed("list", from, e))?;

    instance
        .mkdir(to, true)
        .await
        .map_err(|e| failed("create directory", to, e))?;
    for dir in &dirs {
        let target = rebase(dir, from, to);
        instance
            .mkdir(&target, true)
            .await
            .map_err(|e| failed("create directory", &target, e))?;
    }

    let mut copied = 0;
    for file in &files {
        let target = rebase(file, from, to);
        let copy = async {
            let content = instance.read_file(file).await?;
            instance.write_file(&target, &content).await
        };
        if let Err(e) = copy.await {
            tracing::warn!(from = %from, failed_at = %file, copied, "Directory move aborted; source left intact");
            return Err(Error::operation(format!(
                "moving '{}' to '{}' stopped at '{}' after copying {} of {} files: {}",
                from,
                to,
                file,
                copied,
                files.len(),
                e
            )));
        }
        copied += 1;
    }

    instance
        .rm(from, true)
        .await
        .map_err(|e| failed("remove", from, e))
}

fn rebase(path: &str, from: &str, to: &str) -> String {
    let relative = path
        .strip_prefix(from)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(path);
    fs_policy::join(to, relative)
}

/// Every directory and file below `dir`, parents before children.
fn list_tree(
    instance: &dyn SandboxInstance,
    dir: String,
) -> BoxFuture<'_, Result<(Vec<String>, Vec<String>)>> {
    Box::pin(async move {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in instance.read_dir(&dir).await? {
            let path = fs_policy::join(&dir, &entry.name);
            if entry.is_directory() {
                dirs.push(path.clone());
                let (nested_dirs, nested_files) = list_tree(instance, path).await?;
                dirs.extend(nested_dirs);
                files.extend(nested_files);
            } else {
                files.push(path);
            }
        }
        Ok((dirs, files))
    })
}
