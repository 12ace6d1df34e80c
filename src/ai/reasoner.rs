//! Reasoner abstraction
//!
//! The reasoner is an opaque oracle: given system instructions, the
//! conversation so far, and the tools it may call, it returns either final
//! text or a set of tool requests. The decision loop and the recursive
//! analyzer both drive a `dyn Reasoner`.

use super::tools::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A tool invocation requested by the reasoner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRequest {
    pub id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

impl ToolRequest {
    pub fn new(tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: format!("toolu_{}", uuid::Uuid::new_v4().simple()),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// One entry of the append-only conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    /// Human request
    User { text: String },
    /// Reasoner response, possibly carrying tool requests
    Assistant {
        text: Option<String>,
        requests: Vec<ToolRequest>,
    },
    ToolResult {
        request_id: String,
        content: String,
        is_error: bool,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn tool_result(request_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self::ToolResult {
            request_id: request_id.into(),
            content: content.into(),
            is_error,
        }
    }
}

/// What the reasoner decided
#[derive(Debug, Clone, PartialEq)]
pub enum ReasonerResponse {
    Final {
        text: String,
    },
    ToolRequests {
        text: Option<String>,
        requests: Vec<ToolRequest>,
    },
}

impl ReasonerResponse {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self::Final { text: text.into() }
    }

    pub fn tool(tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::ToolRequests {
            text: None,
            requests: vec![ToolRequest::new(tool_name, arguments)],
        }
    }

    /// The conversation turn recording this response
    pub fn to_turn(&self) -> Turn {
        match self {
            Self::Final { text } => Turn::Assistant {
                text: Some(text.clone()),
                requests: Vec::new(),
            },
            Self::ToolRequests { text, requests } => Turn::Assistant {
                text: text.clone(),
                requests: requests.clone(),
            },
        }
    }
}

/// Token usage reported by the reasoner (advisory)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

#[derive(Debug, Clone)]
pub struct ReasonerReply {
    pub response: ReasonerResponse,
    pub usage: TokenUsage,
}

impl From<ReasonerResponse> for ReasonerReply {
    fn from(response: ReasonerResponse) -> Self {
        Self {
            response,
            usage: TokenUsage::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReasonerError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Failed to parse response: {0}")]
    MalformedResponse(String),

    #[error("No API key configured")]
    MissingApiKey,
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn invoke(
        &self,
        system: &str,
        conversation: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<ReasonerReply, ReasonerError>;

    /// Model identifier, for logs
    fn model(&self) -> &str;
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_to_turn() {
        let final_turn = ReasonerResponse::final_text("Moved.").to_turn();
        assert_eq!(
            final_turn,
            Turn::Assistant {
                text: Some("Moved.".to_string()),
                requests: vec![]
            }
        );

        let tool = ReasonerResponse::tool("list_contents", json!({"prefix": "inbox"}));
        match tool.to_turn() {
            Turn::Assistant { requests, .. } => {
                assert_eq!(requests.len(), 1);
                assert_eq!(requests[0].tool_name, "list_contents");
                assert!(requests[0].id.starts_with("toolu_"));
            }
            other => panic!("unexpected turn {:?}", other),
        }
    }

    #[test]
    fn test_token_usage_accumulates() {
        let mut usage = TokenUsage::default();
        usage.add(TokenUsage {
            input_tokens: 100,
            output_tokens: 20,
        });
        usage.add(TokenUsage {
            input_tokens: 1,
            output_tokens: 2,
        });
        assert_eq!(usage.total(), 123);
    }
}
