//! In-process storage backend
//!
//! Keeps objects in a sorted map and implements every optional capability,
//! which makes it the backend of choice for tests and dry runs.

use super::{
    base_name, join_path, parent_of, FolderColoring, PermissionCapability, PermissionEntry,
    StorageBackend, StorageError,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<String, Vec<u8>>,
    folders: BTreeSet<String>,
    /// Role assignments per object or folder
    assignments: HashMap<String, Vec<PermissionEntry>>,
    /// Objects whose inheritance has been broken
    unique_permissions: HashSet<String>,
    colors: HashMap<String, String>,
    /// Principals the backend refuses to grant roles to
    denied_principals: HashSet<i64>,
    /// When set, `break_inheritance` is refused
    inheritance_locked: bool,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, creating its parent folders
    pub fn insert(&self, id: &str, content: impl Into<Vec<u8>>) {
        if let Ok(mut state) = self.state.write() {
            register_ancestors(&mut state.folders, parent_of(id));
            state.objects.insert(id.to_string(), content.into());
        }
    }

    /// Seed the role assignments of a folder or object
    pub fn set_role_assignments(&self, id: &str, entries: Vec<PermissionEntry>) {
        if let Ok(mut state) = self.state.write() {
            state.assignments.insert(id.to_string(), entries);
        }
    }

    /// Make `add_role_assignment` fail for a principal
    pub fn deny_principal(&self, principal_id: i64) {
        if let Ok(mut state) = self.state.write() {
            state.denied_principals.insert(principal_id);
        }
    }

    /// Make `break_inheritance` fail for every object
    pub fn lock_inheritance(&self) {
        if let Ok(mut state) = self.state.write() {
            state.inheritance_locked = true;
        }
    }

    /// Role assignments currently on `id`
    pub fn role_assignments_of(&self, id: &str) -> Vec<PermissionEntry> {
        self.state
            .read()
            .map(|s| s.assignments.get(id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn has_unique_permissions(&self, id: &str) -> bool {
        self.state
            .read()
            .map(|s| s.unique_permissions.contains(id))
            .unwrap_or(false)
    }

    pub fn color_of(&self, folder: &str) -> Option<String> {
        self.state.read().ok().and_then(|s| s.colors.get(folder).cloned())
    }

    /// All object identifiers, sorted
    pub fn object_ids(&self) -> Vec<String> {
        self.state
            .read()
            .map(|s| s.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>, StorageError> {
        self.state
            .read()
            .map_err(|_| StorageError::Backend("memory backend lock poisoned".to_string()))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>, StorageError> {
        self.state
            .write()
            .map_err(|_| StorageError::Backend("memory backend lock poisoned".to_string()))
    }
}

fn normalize(id: &str) -> &str {
    id.trim_matches('/')
}

fn register_ancestors(folders: &mut BTreeSet<String>, folder: &str) {
    let mut current = normalize(folder).to_string();
    while !current.is_empty() {
        folders.insert(current.clone());
        current = parent_of(&current).to_string();
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list(&self, container: &str) -> Result<Vec<String>, StorageError> {
        let container = normalize(container);
        let state = self.read_state()?;
        Ok(state
            .objects
            .keys()
            .filter(|k| parent_of(k) == container)
            .cloned()
            .collect())
    }

    async fn list_folders(&self, container: &str) -> Result<Vec<String>, StorageError> {
        let container = normalize(container);
        let state = self.read_state()?;
        Ok(state
            .folders
            .iter()
            .filter(|f| parent_of(f) == container)
            .cloned()
            .collect())
    }

    async fn read(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        let state = self.read_state()?;
        state
            .objects
            .get(normalize(id))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn exists(&self, id: &str) -> Result<bool, StorageError> {
        let id = normalize(id);
        let state = self.read_state()?;
        Ok(state.objects.contains_key(id) || state.folders.contains(id))
    }

    async fn move_object(&self, source: &str, target: &str) -> Result<(), StorageError> {
        let (source, target) = (normalize(source), normalize(target));
        let mut state = self.write_state()?;

        if state.objects.contains_key(target) {
            return Err(StorageError::AlreadyExists(target.to_string()));
        }
        let content = state
            .objects
            .remove(source)
            .ok_or_else(|| StorageError::NotFound(source.to_string()))?;

        register_ancestors(&mut state.folders, parent_of(target));
        state.objects.insert(target.to_string(), content);

        // Moved objects inherit from their new parent
        state.assignments.remove(source);
        state.unique_permissions.remove(source);
        Ok(())
    }

    async fn rename(&self, source: &str, new_name: &str) -> Result<String, StorageError> {
        if new_name.contains('/') || new_name.is_empty() {
            return Err(StorageError::InvalidIdentifier(format!(
                "'{}' is not a plain file name",
                new_name
            )));
        }
        if base_name(source) == new_name {
            return Ok(normalize(source).to_string());
        }
        let target = join_path(parent_of(source), new_name);
        self.move_object(source, &target).await?;
        Ok(target)
    }

    async fn create_container(&self, path: &str) -> Result<(), StorageError> {
        let mut state = self.write_state()?;
        if state.objects.contains_key(normalize(path)) {
            return Err(StorageError::AlreadyExists(format!("{} is a file", path)));
        }
        register_ancestors(&mut state.folders, path);
        Ok(())
    }

    async fn is_container(&self, id: &str) -> Result<bool, StorageError> {
        let id = normalize(id);
        let state = self.read_state()?;
        Ok(id.is_empty() || state.folders.contains(id))
    }

    fn permissions(&self) -> Option<&dyn PermissionCapability> {
        Some(self)
    }

    fn folder_coloring(&self) -> Option<&dyn FolderColoring> {
        Some(self)
    }
}

#[async_trait]
impl PermissionCapability for MemoryBackend {
    async fn role_assignments(&self, container: &str) -> Result<Vec<PermissionEntry>, StorageError> {
        let state = self.read_state()?;
        let container = normalize(container);
        if !state.folders.contains(container) {
            return Err(StorageError::NotFound(container.to_string()));
        }
        Ok(state.assignments.get(container).cloned().unwrap_or_default())
    }

    async fn break_inheritance(&self, object: &str) -> Result<(), StorageError> {
        let object = normalize(object);
        let mut state = self.write_state()?;
        if !state.objects.contains_key(object) {
            return Err(StorageError::NotFound(object.to_string()));
        }
        if state.inheritance_locked {
            return Err(StorageError::PermissionDenied(format!(
                "inheritance of {} cannot be broken",
                object
            )));
        }
        state.unique_permissions.insert(object.to_string());
        state.assignments.insert(object.to_string(), Vec::new());
        Ok(())
    }

    async fn add_role_assignment(
        &self,
        object: &str,
        principal_id: i64,
        role_definition_id: i64,
    ) -> Result<(), StorageError> {
        let object = normalize(object);
        let mut state = self.write_state()?;
        if state.denied_principals.contains(&principal_id) {
            return Err(StorageError::PermissionDenied(format!(
                "principal {} cannot be granted roles",
                principal_id
            )));
        }
        if !state.unique_permissions.contains(object) {
            return Err(StorageError::Backend(format!(
                "{} still inherits permissions",
                object
            )));
        }

        let entries = state.assignments.entry(object.to_string()).or_default();
        match entries.iter_mut().find(|e| e.principal_id == principal_id) {
            Some(entry) => entry.role_definition_ids.push(role_definition_id),
            None => entries.push(PermissionEntry {
                principal_id,
                role_definition_ids: vec![role_definition_id],
            }),
        }
        Ok(())
    }
}

#[async_trait]
impl FolderColoring for MemoryBackend {
    async fn set_folder_color(&self, folder: &str, color: &str) -> Result<(), StorageError> {
        let folder = normalize(folder);
        let mut state = self.write_state()?;
        if !state.folders.contains(folder) {
            return Err(StorageError::NotFound(folder.to_string()));
        }
        state.colors.insert(folder.to_string(), color.to_string());
        Ok(())
    }
}
