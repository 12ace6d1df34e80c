//! Local filesystem backend
//!
//! Identifiers are `/`-separated paths relative to the backend root.
//! Moves try a same-filesystem rename first and fall back to copy+delete.

use super::{base_name, join_path, parent_of, StorageBackend, StorageError};
use async_trait::async_trait;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an identifier to a path under the root
    ///
    /// Uses lexical checks instead of canonicalize() so that targets that do
    /// not exist yet can still be validated.
    fn resolve(&self, id: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(id.trim_start_matches('/'));
        let mut resolved = self.root.clone();

        for component in relative.components() {
            match component {
                Component::Normal(name) => resolved.push(name),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidIdentifier(format!(
                        "{} escapes the storage root",
                        id
                    )));
                }
            }
        }

        Ok(resolved)
    }

    /// Identifier for a path found under the root
    fn identifier_for(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn children(&self, container: &str, want_dirs: bool) -> Result<Vec<String>, StorageError> {
        let dir = self.resolve(container)?;
        if !dir.is_dir() {
            return Err(StorageError::NotFound(container.to_string()));
        }

        let mut entries: Vec<String> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                if want_dirs {
                    e.file_type().is_dir()
                } else {
                    e.file_type().is_file()
                }
            })
            .map(|e| self.identifier_for(e.path()))
            .collect();

        entries.sort();
        Ok(entries)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn list(&self, container: &str) -> Result<Vec<String>, StorageError> {
        self.children(container, false)
    }

    async fn list_folders(&self, container: &str) -> Result<Vec<String>, StorageError> {
        self.children(container, true)
    }

    async fn read(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, id: &str) -> Result<bool, StorageError> {
        let path = self.resolve(id)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn move_object(&self, source: &str, target: &str) -> Result<(), StorageError> {
        let source_path = self.resolve(source)?;
        let target_path = self.resolve(target)?;
        let source_id = source.to_string();
        let target_id = target.to_string();

        tokio::task::spawn_blocking(move || {
            move_file_sync(&source_path, &target_path, &source_id, &target_id)
        })
        .await
        .map_err(|e| StorageError::Backend(format!("Task failed: {}", e)))?
    }

    async fn rename(&self, source: &str, new_name: &str) -> Result<String, StorageError> {
        if new_name.contains('/') || new_name.is_empty() {
            return Err(StorageError::InvalidIdentifier(format!(
                "'{}' is not a plain file name",
                new_name
            )));
        }
        if base_name(source) == new_name {
            return Ok(source.to_string());
        }

        let target = join_path(parent_of(source), new_name);
        self.move_object(source, &target).await?;
        Ok(target)
    }

    async fn create_container(&self, path: &str) -> Result<(), StorageError> {
        let dir = self.resolve(path)?;
        if dir.is_dir() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn is_container(&self, id: &str) -> Result<bool, StorageError> {
        let path = self.resolve(id)?;
        Ok(path.is_dir())
    }
}

fn move_file_sync(
    source: &Path,
    destination: &Path,
    source_id: &str,
    target_id: &str,
) -> Result<(), StorageError> {
    if !source.exists() {
        return Err(StorageError::NotFound(source_id.to_string()));
    }

    if destination.exists() {
        return Err(StorageError::AlreadyExists(target_id.to_string()));
    }

    // Ensure destination parent exists
    if let Some(parent) = destination.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    // Try rename first (same filesystem), fall back to copy+delete
    if fs::rename(source, destination).is_err() {
        fs::copy(source, destination)?;
        fs::remove_file(source)?;
    }

    Ok(())
}
