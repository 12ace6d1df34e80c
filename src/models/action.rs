use serde::{Deserialize, Serialize};

/// Kind of action the executor performed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Move,
    SecureMove,
    Rename,
    List,
    FolderTree,
    Read,
    CreateFolder,
    /// A tool request that could not be decoded into a known tool
    Invalid,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::SecureMove => "secure_move",
            Self::Rename => "rename",
            Self::List => "list",
            Self::FolderTree => "folder_tree",
            Self::Read => "read",
            Self::CreateFolder => "create_folder",
            Self::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Failed,
}

/// Outcome of one executed tool call
///
/// Fed back into the conversation as the tool result. A successful move
/// has already been learned by the similarity memory when this is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action_kind: ActionKind,
    pub source_identifier: Option<String>,
    pub destination_identifier: Option<String>,
    pub status: ActionStatus,
    pub message: String,
    /// Set when the action succeeded only partially (secure move whose
    /// permission step did not fully apply)
    #[serde(default)]
    pub degraded: bool,
}

impl ActionResult {
    pub fn succeeded(kind: ActionKind, message: impl Into<String>) -> Self {
        Self {
            action_kind: kind,
            source_identifier: None,
            destination_identifier: None,
            status: ActionStatus::Succeeded,
            message: message.into(),
            degraded: false,
        }
    }

    pub fn failed(kind: ActionKind, message: impl Into<String>) -> Self {
        Self {
            action_kind: kind,
            source_identifier: None,
            destination_identifier: None,
            status: ActionStatus::Failed,
            message: message.into(),
            degraded: false,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_identifier = Some(source.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination_identifier = Some(destination.into());
        self
    }

    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Succeeded
    }

    /// Text handed back to the reasoner as the tool result
    pub fn to_tool_content(&self) -> String {
        match self.status {
            ActionStatus::Succeeded if self.degraded => {
                format!("PARTIAL SUCCESS: {}", self.message)
            }
            ActionStatus::Succeeded => self.message.clone(),
            ActionStatus::Failed => format!("FAILED ({}): {}", self.action_kind.as_str(), self.message),
        }
    }
}
