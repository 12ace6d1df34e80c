//! Storage Backends
//!
//! Backend-agnostic storage capability used by the action executor.
//! Identifiers are `/`-separated paths in every backend:
//! - `local` - directory tree rooted at a configured folder
//! - `object_store` - S3 bucket, folders are key prefixes
//! - `sharepoint` - document library, identifiers are server-relative URLs
//! - `memory` - in-process backend for tests and dry runs
//!
//! Capabilities only some backends have (permission propagation, folder
//! colouring) are optional extension traits reached through
//! [`StorageBackend::permissions`] and [`StorageBackend::folder_coloring`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod local;
pub mod memory;
pub mod object_store;
pub mod sharepoint;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use object_store::ObjectStoreBackend;
pub use sharepoint::DocumentLibraryBackend;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One role assignment captured from a container: a principal and the
/// role definitions bound to it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionEntry {
    pub principal_id: i64,
    pub role_definition_ids: Vec<i64>,
}

/// Core storage capability shared by every backend
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Files directly inside `container`
    async fn list(&self, container: &str) -> Result<Vec<String>, StorageError>;

    /// Sub-containers directly inside `container`
    async fn list_folders(&self, container: &str) -> Result<Vec<String>, StorageError>;

    async fn read(&self, id: &str) -> Result<Vec<u8>, StorageError>;

    async fn exists(&self, id: &str) -> Result<bool, StorageError>;

    /// Move `source` to the exact identifier `target`. Collision handling is
    /// the caller's job.
    async fn move_object(&self, source: &str, target: &str) -> Result<(), StorageError>;

    /// Rename within the same container, returning the new identifier
    async fn rename(&self, source: &str, new_name: &str) -> Result<String, StorageError>;

    /// Ensure `path` exists as a container. Must succeed if it already exists.
    async fn create_container(&self, path: &str) -> Result<(), StorageError>;

    async fn is_container(&self, id: &str) -> Result<bool, StorageError>;

    fn permissions(&self) -> Option<&dyn PermissionCapability> {
        None
    }

    fn folder_coloring(&self) -> Option<&dyn FolderColoring> {
        None
    }
}

/// Role-assignment management (document-management backends)
#[async_trait]
pub trait PermissionCapability: Send + Sync {
    async fn role_assignments(&self, container: &str) -> Result<Vec<PermissionEntry>, StorageError>;

    /// Stop inheriting from the parent, starting from an empty assignment set
    async fn break_inheritance(&self, object: &str) -> Result<(), StorageError>;

    async fn add_role_assignment(
        &self,
        object: &str,
        principal_id: i64,
        role_definition_id: i64,
    ) -> Result<(), StorageError>;
}

/// Folder colour tags (document-management backends)
#[async_trait]
pub trait FolderColoring: Send + Sync {
    async fn set_folder_color(&self, folder: &str, color: &str) -> Result<(), StorageError>;
}

/// Join a container and a name with a single `/`
pub fn join_path(container: &str, name: &str) -> String {
    let container = container.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if container.is_empty() {
        name.to_string()
    } else if name.is_empty() {
        container.to_string()
    } else {
        format!("{}/{}", container, name)
    }
}

/// Last path segment of an identifier
pub fn base_name(id: &str) -> &str {
    let trimmed = id.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Everything before the last segment ("" for top-level identifiers)
pub fn parent_of(id: &str) -> &str {
    let trimmed = id.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

/// Split a file name into stem and extension (extension keeps its dot).
/// Dotfiles such as `.env` have no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => (&name[..idx], &name[idx..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("Finance/Invoices", "a.pdf"), "Finance/Invoices/a.pdf");
        assert_eq!(join_path("Finance/", "/a.pdf"), "Finance/a.pdf");
        assert_eq!(join_path("", "a.pdf"), "a.pdf");
        assert_eq!(join_path("dir", ""), "dir");
    }

    #[test]
    fn test_base_name_and_parent() {
        assert_eq!(base_name("inbox/grocery_list.txt"), "grocery_list.txt");
        assert_eq!(base_name("grocery_list.txt"), "grocery_list.txt");
        assert_eq!(base_name("folder/"), "folder");
        assert_eq!(parent_of("a/b/c.txt"), "a/b");
        assert_eq!(parent_of("c.txt"), "");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("grocery_list.txt"), ("grocery_list", ".txt"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".env"), (".env", ""));
    }
}
