pub mod client;
pub mod json_parser;
pub mod prompts;
pub mod reasoner;
pub mod tools;

pub use client::{AnthropicReasoner, DEFAULT_MODEL, DEFAULT_SUBQUERY_MODEL};
pub use reasoner::*;
pub use tools::{sorting_tools, ToolCall, ToolDefinition};
