//! Action Executor
//!
//! Runs decoded tool calls against a storage backend. Every call produces an
//! [`ActionResult`]; backend errors become failed results for the reasoner
//! to read, never errors for the caller.
//!
//! Successful moves are fed back into the similarity memory.

use super::naming::free_identifier;
use crate::ai::ToolCall;
use crate::extract::{is_diagnostic, ContentExtractor, DocumentExtractor};
use crate::models::{ActionKind, ActionResult};
use crate::storage::{base_name, join_path, StorageBackend, StorageError};
use crate::vector::SimilarityMemory;
use std::sync::Arc;

/// Default bound on `name_N.ext` attempts
pub const DEFAULT_MAX_COLLISION_ATTEMPTS: usize = 1000;

/// Root under which object-store destinations are placed
pub const OBJECT_STORE_DESTINATION_ROOT: &str = "sorted";

pub const DEFAULT_FOLDER_TREE_DEPTH: usize = 3;
pub const MAX_FOLDER_TREE_DEPTH: usize = 5;
/// Lines in a folder tree before it is cut off
pub const MAX_FOLDER_TREE_ENTRIES: usize = 200;

pub struct ActionExecutor {
    backend: Arc<dyn StorageBackend>,
    memory: Arc<SimilarityMemory>,
    extractor: DocumentExtractor,
    destination_root: String,
    max_collision_attempts: usize,
}

/// A completed move, before any permission work
struct Moved {
    target: String,
    container: String,
}

impl ActionExecutor {
    pub fn new(backend: Arc<dyn StorageBackend>, memory: Arc<SimilarityMemory>) -> Self {
        let destination_root = if backend.name() == "object_store" {
            OBJECT_STORE_DESTINATION_ROOT.to_string()
        } else {
            String::new()
        };

        Self {
            backend,
            memory,
            extractor: DocumentExtractor::default(),
            destination_root,
            max_collision_attempts: DEFAULT_MAX_COLLISION_ATTEMPTS,
        }
    }

    pub fn with_destination_root(mut self, root: impl Into<String>) -> Self {
        self.destination_root = root.into().trim_matches('/').to_string();
        self
    }

    pub fn with_max_collision_attempts(mut self, attempts: usize) -> Self {
        self.max_collision_attempts = attempts.max(1);
        self
    }

    pub fn with_extractor(mut self, extractor: DocumentExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn extractor(&self) -> &DocumentExtractor {
        &self.extractor
    }

    pub fn supports_permissions(&self) -> bool {
        self.backend.permissions().is_some()
    }

    pub fn supports_folder_color(&self) -> bool {
        self.backend.folder_coloring().is_some()
    }

    /// Execute one decoded tool call
    pub async fn execute(&self, call: &ToolCall) -> ActionResult {
        tracing::debug!("[Executor] {} on {}", call.name(), self.backend.name());

        let result = match call {
            ToolCall::MoveFile {
                source_key,
                destination_folder,
            } => self.move_file(source_key, destination_folder).await,
            ToolCall::SecureMoveFile {
                source_key,
                destination_folder,
                permissions_source,
            } => {
                self.secure_move(source_key, destination_folder, permissions_source)
                    .await
            }
            ToolCall::RenameFile { source_key, new_name } => self.rename(source_key, new_name).await,
            ToolCall::ListContents { prefix } => self.list(prefix).await,
            ToolCall::FolderTree { root, max_depth } => self.folder_tree(root, *max_depth).await,
            ToolCall::ReadFileContent { file_key } => self.read(file_key).await,
            ToolCall::CreateFolder { folder_path, color } => {
                self.create_folder(folder_path, color.as_deref()).await
            }
        };

        if result.is_success() {
            tracing::info!("[Executor] {}: {}", call.name(), result.message);
        } else {
            tracing::warn!("[Executor] {} failed: {}", call.name(), result.message);
        }
        result
    }

    /// Destination container for a folder named by the reasoner
    fn resolve_destination(&self, folder: &str) -> String {
        let folder = folder.trim_matches('/');
        let root = self.destination_root.as_str();
        if root.is_empty() || folder == root || folder.starts_with(&format!("{}/", root)) {
            folder.to_string()
        } else {
            join_path(root, folder)
        }
    }

    /// Collision-free move plus best-effort learning
    async fn move_and_learn(&self, source: &str, destination_folder: &str) -> Result<Moved, StorageError> {
        let source = source.trim_matches('/');
        if source.is_empty() {
            return Err(StorageError::InvalidIdentifier("source is empty".to_string()));
        }
        if !self.backend.exists(source).await? {
            return Err(StorageError::NotFound(source.to_string()));
        }
        if self.backend.is_container(source).await? {
            return Err(StorageError::InvalidIdentifier(format!("{} is a folder, not a file", source)));
        }

        let container = self.resolve_destination(destination_folder);
        self.backend.create_container(&container).await?;

        let target = free_identifier(
            self.backend.as_ref(),
            &container,
            base_name(source),
            self.max_collision_attempts,
        )
        .await?;
        self.backend.move_object(source, &target).await?;

        // Memory records are tagged with the folder as the reasoner named it
        let content = self.extractor.extract(self.backend.as_ref(), &target).await;
        if is_diagnostic(&content) {
            tracing::debug!("[Executor] Not learning {}: {}", target, content);
        } else {
            self.memory.learn(&content, destination_folder).await;
        }

        Ok(Moved { target, container })
    }

    pub async fn move_file(&self, source: &str, destination_folder: &str) -> ActionResult {
        match self.move_and_learn(source, destination_folder).await {
            Ok(moved) => ActionResult::succeeded(ActionKind::Move, format!("Moved to {}", moved.target))
                .with_source(source)
                .with_destination(moved.target),
            Err(e) => ActionResult::failed(ActionKind::Move, e.to_string()).with_source(source),
        }
    }

    /// Move, then give the moved object the role assignments of
    /// `permissions_source`
    ///
    /// Not atomic: once the move succeeded the result is a success, degraded
    /// when fewer permission entries were applied than requested.
    pub async fn secure_move(
        &self,
        source: &str,
        destination_folder: &str,
        permissions_source: &str,
    ) -> ActionResult {
        let Some(permissions) = self.backend.permissions() else {
            return ActionResult::failed(
                ActionKind::SecureMove,
                format!("{} backend cannot propagate permissions", self.backend.name()),
            )
            .with_source(source);
        };

        let entries = match permissions.role_assignments(permissions_source).await {
            Ok(entries) => entries,
            Err(e) => {
                return ActionResult::failed(
                    ActionKind::SecureMove,
                    format!("could not read permissions of '{}': {}", permissions_source, e),
                )
                .with_source(source)
            }
        };

        let moved = match self.move_and_learn(source, destination_folder).await {
            Ok(moved) => moved,
            Err(e) => return ActionResult::failed(ActionKind::SecureMove, e.to_string()).with_source(source),
        };

        let requested: usize = entries.iter().map(|e| e.role_definition_ids.len()).sum();
        let result = |message: String, applied: usize| {
            let result = ActionResult::succeeded(ActionKind::SecureMove, message)
                .with_source(source)
                .with_destination(moved.target.clone());
            if applied < requested {
                result.degraded()
            } else {
                result
            }
        };

        if let Err(e) = permissions.break_inheritance(&moved.target).await {
            tracing::warn!("[Executor] Could not break inheritance on {}: {}", moved.target, e);
            return result(
                format!(
                    "Moved {} to {} but could not break permission inheritance ({}); applied 0 of {} unique permission entries.",
                    source, moved.container, e, requested
                ),
                0,
            );
        }

        let mut applied = 0;
        for entry in &entries {
            for role in &entry.role_definition_ids {
                match permissions
                    .add_role_assignment(&moved.target, entry.principal_id, *role)
                    .await
                {
                    Ok(()) => applied += 1,
                    Err(e) => tracing::warn!(
                        "[Executor] Role {} for principal {} not applied to {}: {}",
                        role,
                        entry.principal_id,
                        moved.target,
                        e
                    ),
                }
            }
        }

        let message = if applied == requested {
            format!("Moved {} and applied {} unique permission entries.", moved.target, applied)
        } else {
            format!(
                "Moved {} and applied {} of {} unique permission entries.",
                moved.target, applied, requested
            )
        };
        result(message, applied)
    }

    pub async fn rename(&self, source: &str, new_name: &str) -> ActionResult {
        let new_name = new_name.trim();
        match self.backend.rename(source, new_name).await {
            Ok(id) => ActionResult::succeeded(ActionKind::Rename, format!("Renamed to {}", id))
                .with_source(source)
                .with_destination(id),
            Err(e) => ActionResult::failed(ActionKind::Rename, e.to_string()).with_source(source),
        }
    }

    pub async fn list(&self, container: &str) -> ActionResult {
        let folders = self.backend.list_folders(container).await;
        let files = self.backend.list(container).await;
        let (folders, files) = match (folders, files) {
            (Ok(folders), Ok(files)) => (folders, files),
            (Err(e), _) | (_, Err(e)) => {
                return ActionResult::failed(ActionKind::List, e.to_string()).with_source(container)
            }
        };

        let label = if container.trim_matches('/').is_empty() {
            "(root)"
        } else {
            container
        };
        if folders.is_empty() && files.is_empty() {
            return ActionResult::succeeded(ActionKind::List, format!("{} is empty", label))
                .with_source(container);
        }

        let mut lines = vec![format!("Contents of {}:", label)];
        lines.extend(folders.iter().map(|f| format!("  [folder] {}", f)));
        lines.extend(files.iter().map(|f| format!("  {}", f)));
        ActionResult::succeeded(ActionKind::List, lines.join("\n")).with_source(container)
    }

    /// Indented hierarchy below `root`, files before sub-folders
    ///
    /// Descends at most `max_depth` levels (clamped to 1..=5) and stops after
    /// [`MAX_FOLDER_TREE_ENTRIES`] lines. Only an unreadable root fails.
    pub async fn folder_tree(&self, root: &str, max_depth: Option<usize>) -> ActionResult {
        let root = root.trim_matches('/');
        let depth = max_depth
            .unwrap_or(DEFAULT_FOLDER_TREE_DEPTH)
            .clamp(1, MAX_FOLDER_TREE_DEPTH);
        let label = if root.is_empty() { "(root)" } else { root };

        let mut lines = vec![format!("Folder tree of {} (depth {}):", label, depth)];
        let mut entries = 0;
        let mut truncated = false;
        let mut stack = vec![(root.to_string(), 0usize)];

        'walk: while let Some((folder, level)) = stack.pop() {
            if level > 0 {
                if entries == MAX_FOLDER_TREE_ENTRIES {
                    truncated = true;
                    break;
                }
                lines.push(format!("{}{}/", "  ".repeat(level), base_name(&folder)));
                entries += 1;
                if level == depth {
                    continue;
                }
            }

            let indent = "  ".repeat(level + 1);
            let (folders, files) = match (
                self.backend.list_folders(&folder).await,
                self.backend.list(&folder).await,
            ) {
                (Ok(folders), Ok(files)) => (folders, files),
                (Err(e), _) | (_, Err(e)) => {
                    if level == 0 {
                        return ActionResult::failed(ActionKind::FolderTree, e.to_string()).with_source(root);
                    }
                    lines.push(format!("{}[unreadable: {}]", indent, e));
                    continue;
                }
            };

            for file in files.iter().filter(|f| !f.ends_with('/')) {
                if entries == MAX_FOLDER_TREE_ENTRIES {
                    truncated = true;
                    break 'walk;
                }
                lines.push(format!("{}{}", indent, base_name(file)));
                entries += 1;
            }
            stack.extend(
                folders
                    .iter()
                    .rev()
                    .map(|f| (f.trim_end_matches('/').to_string(), level + 1)),
            );
        }

        if entries == 0 {
            return ActionResult::succeeded(ActionKind::FolderTree, format!("{} is empty", label))
                .with_source(root);
        }
        if truncated {
            lines.push(format!("... truncated after {} entries", MAX_FOLDER_TREE_ENTRIES));
        }
        ActionResult::succeeded(ActionKind::FolderTree, lines.join("\n")).with_source(root)
    }

    pub async fn read(&self, id: &str) -> ActionResult {
        let text = self.extractor.extract(self.backend.as_ref(), id).await;
        if is_diagnostic(&text) {
            ActionResult::failed(ActionKind::Read, text).with_source(id)
        } else {
            ActionResult::succeeded(ActionKind::Read, text).with_source(id)
        }
    }

    pub async fn create_folder(&self, path: &str, color: Option<&str>) -> ActionResult {
        let container = self.resolve_destination(path);
        if container.is_empty() {
            return ActionResult::failed(ActionKind::CreateFolder, "folder path is empty");
        }
        if let Err(e) = self.backend.create_container(&container).await {
            return ActionResult::failed(ActionKind::CreateFolder, e.to_string()).with_destination(container);
        }

        let Some(color) = color.map(str::trim).filter(|c| !c.is_empty()) else {
            return ActionResult::succeeded(ActionKind::CreateFolder, format!("Folder ready: {}", container))
                .with_destination(container);
        };

        match self.backend.folder_coloring() {
            None => ActionResult::succeeded(
                ActionKind::CreateFolder,
                format!(
                    "Folder ready: {} (colour tags are not supported by the {} backend)",
                    container,
                    self.backend.name()
                ),
            )
            .with_destination(container)
            .degraded(),
            Some(coloring) => match coloring.set_folder_color(&container, color).await {
                Ok(()) => ActionResult::succeeded(
                    ActionKind::CreateFolder,
                    format!("Folder ready: {} (colour {})", container, color),
                )
                .with_destination(container),
                Err(e) => ActionResult::succeeded(
                    ActionKind::CreateFolder,
                    format!("Folder ready: {} but colour was not applied: {}", container, e),
                )
                .with_destination(container)
                .degraded(),
            },
        }
    }
}
