//! Sorting tool registry
//!
//! The fixed set of tools the decision loop offers the reasoner. Requests are
//! decoded from `(tool_name, arguments)` into a typed [`ToolCall`]; unknown
//! names and malformed arguments are reportable errors, never panics.

use super::reasoner::ToolRequest;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Tool definition for the Anthropic API
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

pub const MOVE_FILE: &str = "move_file";
pub const SECURE_MOVE_FILE: &str = "secure_move_file";
pub const RENAME_FILE: &str = "rename_file";
pub const LIST_CONTENTS: &str = "list_contents";
pub const FOLDER_TREE: &str = "folder_tree";
pub const READ_FILE_CONTENT: &str = "read_file_content";
pub const CREATE_FOLDER: &str = "create_folder";

const TOOL_NAMES: &[&str] = &[
    MOVE_FILE,
    SECURE_MOVE_FILE,
    RENAME_FILE,
    LIST_CONTENTS,
    FOLDER_TREE,
    READ_FILE_CONTENT,
    CREATE_FOLDER,
];

/// A decoded tool request
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tool_name", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    MoveFile {
        source_key: String,
        destination_folder: String,
    },
    SecureMoveFile {
        source_key: String,
        destination_folder: String,
        permissions_source: String,
    },
    RenameFile {
        source_key: String,
        new_name: String,
    },
    ListContents {
        #[serde(default)]
        prefix: String,
    },
    FolderTree {
        #[serde(default)]
        root: String,
        #[serde(default)]
        max_depth: Option<usize>,
    },
    ReadFileContent {
        file_key: String,
    },
    CreateFolder {
        folder_path: String,
        #[serde(default)]
        color: Option<String>,
    },
}

impl ToolCall {
    pub fn decode(request: &ToolRequest) -> Result<Self, String> {
        let name = request.tool_name.as_str();
        if !TOOL_NAMES.contains(&name) {
            return Err(format!("Unknown tool: {}", name));
        }

        let arguments = if request.arguments.is_null() {
            json!({})
        } else {
            request.arguments.clone()
        };

        serde_json::from_value(json!({ "tool_name": name, "arguments": arguments }))
            .map_err(|e| format!("Invalid arguments for {}: {}", name, e))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MoveFile { .. } => MOVE_FILE,
            Self::SecureMoveFile { .. } => SECURE_MOVE_FILE,
            Self::RenameFile { .. } => RENAME_FILE,
            Self::ListContents { .. } => LIST_CONTENTS,
            Self::FolderTree { .. } => FOLDER_TREE,
            Self::ReadFileContent { .. } => READ_FILE_CONTENT,
            Self::CreateFolder { .. } => CREATE_FOLDER,
        }
    }
}

/// Tools offered for a backend
///
/// `secure_move_file` is only offered when the backend can propagate
/// permissions.
pub fn sorting_tools(supports_permissions: bool, supports_color: bool) -> Vec<ToolDefinition> {
    let mut tools = vec![
        ToolDefinition {
            name: MOVE_FILE.to_string(),
            description: "Move a file into a destination folder. Creates the folder if needed and picks a free name (name_1.ext, name_2.ext, ...) if the file name is taken. Returns the final path.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source_key": {
                        "type": "string",
                        "description": "Identifier of the file to move, exactly as given"
                    },
                    "destination_folder": {
                        "type": "string",
                        "description": "Destination folder path, e.g. 'Finance/Invoices/AWS'"
                    }
                },
                "required": ["source_key", "destination_folder"]
            }),
        },
        ToolDefinition {
            name: RENAME_FILE.to_string(),
            description: "Rename a file within its current folder.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source_key": {
                        "type": "string",
                        "description": "Identifier of the file to rename"
                    },
                    "new_name": {
                        "type": "string",
                        "description": "New file name including extension, no folders"
                    }
                },
                "required": ["source_key", "new_name"]
            }),
        },
        ToolDefinition {
            name: LIST_CONTENTS.to_string(),
            description: "List the files and sub-folders directly inside a folder. Use it to see existing destination folders before inventing new ones.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prefix": {
                        "type": "string",
                        "description": "Folder to list; empty for the root"
                    }
                }
            }),
        },
        ToolDefinition {
            name: FOLDER_TREE.to_string(),
            description: "Show the folder hierarchy (sub-folders and files) below a folder, a few levels deep. Use it to learn the existing taxonomy before choosing a destination.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "root": {
                        "type": "string",
                        "description": "Folder to start from; empty for the root"
                    },
                    "max_depth": {
                        "type": "integer",
                        "description": "Levels to descend (default 3, at most 5)"
                    }
                }
            }),
        },
        ToolDefinition {
            name: READ_FILE_CONTENT.to_string(),
            description: "Read the extracted text of a file (bounded sample for large files).".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_key": {
                        "type": "string",
                        "description": "Identifier of the file to read"
                    }
                },
                "required": ["file_key"]
            }),
        },
    ];

    let mut create_folder_props = json!({
        "folder_path": {
            "type": "string",
            "description": "Folder path to create; existing folders are fine"
        }
    });
    if supports_color {
        create_folder_props["color"] = json!({
            "type": "string",
            "description": "Optional folder colour tag: 0=Yellow, 1=DarkRed, 2=DarkOrange, 3=DarkGreen, 4=LightBlue, 5=LightTeal, 6=Blue"
        });
    }
    tools.push(ToolDefinition {
        name: CREATE_FOLDER.to_string(),
        description: "Ensure a folder exists.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": create_folder_props,
            "required": ["folder_path"]
        }),
    });

    if supports_permissions {
        tools.push(ToolDefinition {
            name: SECURE_MOVE_FILE.to_string(),
            description: "Move a file AND give it the permissions of another folder. Use this when moving files out of a restricted folder so they stay restricted.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "source_key": {
                        "type": "string",
                        "description": "Identifier of the file to move"
                    },
                    "destination_folder": {
                        "type": "string",
                        "description": "Destination folder path"
                    },
                    "permissions_source": {
                        "type": "string",
                        "description": "Folder whose role assignments the moved file should receive"
                    }
                },
                "required": ["source_key", "destination_folder", "permissions_source"]
            }),
        });
    }

    tools
}
