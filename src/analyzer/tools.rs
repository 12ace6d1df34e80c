//! Analyzer-only tools
//!
//! The planner never sees the document; it inspects and summarizes it
//! through these tools.

use crate::ai::{ToolDefinition, ToolRequest};
use crate::vector::TextChunker;
use serde::Deserialize;
use serde_json::json;

pub const CONTENT_LENGTH: &str = "content_length";
pub const SPLIT_CONTENT: &str = "split_content";
pub const SUMMARIZE_CHUNKS: &str = "summarize_chunks";
pub const PEEK: &str = "peek";

const TOOL_NAMES: &[&str] = &[CONTENT_LENGTH, SPLIT_CONTENT, SUMMARIZE_CHUNKS, PEEK];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    #[default]
    Paragraphs,
    Lines,
    Fixed,
}

impl SplitStrategy {
    pub fn split(&self, content: &str, max_chunk_chars: usize) -> Vec<String> {
        let max_chunk_chars = max_chunk_chars.max(1);
        match self {
            Self::Paragraphs => TextChunker::new(max_chunk_chars, 0).split(content),
            Self::Lines => TextChunker::new(max_chunk_chars, 0)
                .with_separators(&["\n", " "])
                .split(content),
            Self::Fixed => {
                let chars: Vec<char> = content.chars().collect();
                chars
                    .chunks(max_chunk_chars)
                    .map(|c| c.iter().collect::<String>())
                    .filter(|c| !c.trim().is_empty())
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tool_name", content = "arguments", rename_all = "snake_case")]
pub enum AnalyzerToolCall {
    ContentLength {},
    SplitContent {
        #[serde(default)]
        strategy: SplitStrategy,
        #[serde(default)]
        max_chunk_chars: Option<usize>,
    },
    SummarizeChunks {
        instruction: String,
        #[serde(default)]
        indices: Option<Vec<usize>>,
    },
    Peek {
        #[serde(default)]
        start: usize,
        #[serde(default)]
        len: Option<usize>,
    },
}

impl AnalyzerToolCall {
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
}

pub fn analyzer_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: CONTENT_LENGTH.to_string(),
            description: "Length of the document in characters and lines.".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDefinition {
            name: SPLIT_CONTENT.to_string(),
            description: "Split the document into chunks. Replaces any previous split. Returns the chunk count and sizes.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "strategy": {
                        "type": "string",
                        "enum": ["paragraphs", "lines", "fixed"],
                        "description": "Where to break chunks (default: paragraphs)"
                    },
                    "max_chunk_chars": {
                        "type": "integer",
                        "description": "Maximum characters per chunk"
                    }
                }
            }),
        },
        ToolDefinition {
            name: SUMMARIZE_CHUNKS.to_string(),
            description: "Run one summarization sub-query per chunk, in parallel. Splits by paragraphs first if no split exists. Returns the partial summaries by chunk index.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "instruction": {
                        "type": "string",
                        "description": "What to extract from each chunk"
                    },
                    "indices": {
                        "type": "array",
                        "items": {"type": "integer"},
                        "description": "Chunk indices to summarize (default: all)"
                    }
                },
                "required": ["instruction"]
            }),
        },
        ToolDefinition {
            name: PEEK.to_string(),
            description: "Read a short slice of the raw document by character offset.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "start": {"type": "integer", "description": "Character offset"},
                    "len": {"type": "integer", "description": "Characters to read"}
                }
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_defaults() {
        let call = AnalyzerToolCall::decode(&ToolRequest::new("split_content", json!({}))).unwrap();
        assert_eq!(
            call,
            AnalyzerToolCall::SplitContent {
                strategy: SplitStrategy::Paragraphs,
                max_chunk_chars: None
            }
        );

        let call = AnalyzerToolCall::decode(&ToolRequest::new("content_length", serde_json::Value::Null)).unwrap();
        assert_eq!(call, AnalyzerToolCall::ContentLength {});
    }

    #[test]
    fn test_sorting_tools_are_not_analyzer_tools() {
        let err = AnalyzerToolCall::decode(&ToolRequest::new("move_file", json!({}))).unwrap_err();
        assert_eq!(err, "Unknown tool: move_file");
    }

    #[test]
    fn test_split_strategies() {
        let text = "line one\nline two\n\nparagraph two line";
        assert_eq!(SplitStrategy::Lines.split(text, 9), vec!["line one", "line two", "paragraph", "two line"]);
        assert_eq!(
            SplitStrategy::Paragraphs.split(text, 20),
            vec!["line one\nline two", "paragraph two line"]
        );
        assert_eq!(SplitStrategy::Fixed.split("abcdefg", 3), vec!["abc", "def", "g"]);
    }
}
