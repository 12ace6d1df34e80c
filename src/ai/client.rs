//! Anthropic Messages API reasoner
//!
//! Translates the conversation into the tool-use wire format and back.
//! Rate-limit (429) and overload (529) responses are retried with
//! exponential backoff.

use super::reasoner::{
    Reasoner, ReasonerError, ReasonerReply, ReasonerResponse, TokenUsage, ToolRequest, Turn,
};
use super::tools::ToolDefinition;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default decision model
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Default model for the analyzer's per-chunk sub-queries
pub const DEFAULT_SUBQUERY_MODEL: &str = "claude-haiku-4-5";

const OVERLOADED: u16 = 529;

/// API request with tools support
#[derive(Serialize)]
struct ToolApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<ToolMessage>,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDefinition],
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

#[derive(Serialize, Debug, Clone)]
struct ToolMessage {
    role: &'static str,
    content: Vec<ToolMessageContent>,
}

/// Content block for tool messages
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolMessageContent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

/// Content block in response
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum ContentBlockResponse {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Default)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize, Debug)]
struct ToolApiResponse {
    content: Vec<ContentBlockResponse>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: ApiUsage,
}

/// API error response
#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct AnthropicReasoner {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    max_retries: u32,
    initial_retry_delay: Duration,
}

impl AnthropicReasoner {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ReasonerError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ReasonerError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ReasonerError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            max_tokens: 4096,
            max_retries: 3,
            initial_retry_delay: Duration::from_secs(2),
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Send request with retry logic
    async fn send_request(&self, request: &ToolApiRequest<'_>) -> Result<ToolApiResponse, ReasonerError> {
        let mut retry_delay = self.initial_retry_delay;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(request)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) if attempt < self.max_retries => {
                    tracing::warn!("[Reasoner] Request failed, retry {}/{}: {}", attempt + 1, self.max_retries, e);
                    continue;
                }
                Err(e) => return Err(ReasonerError::Transport(e.to_string())),
            };

            let status = response.status();
            if status.as_u16() == 429 || status.as_u16() == OVERLOADED {
                tracing::warn!(
                    "[Reasoner] {} ({}), retry {}/{}",
                    if status.as_u16() == 429 { "Rate limited" } else { "Overloaded" },
                    status,
                    attempt + 1,
                    self.max_retries
                );
                continue;
            }

            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiError>(&error_text)
                    .map(|e| e.error.message)
                    .unwrap_or(error_text);
                return Err(ReasonerError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return response
                .json()
                .await
                .map_err(|e| ReasonerError::MalformedResponse(e.to_string()));
        }

        Err(ReasonerError::RateLimited {
            attempts: self.max_retries + 1,
        })
    }
}

/// Convert the conversation to API messages
///
/// Consecutive tool results are grouped into one user message, as the API
/// requires every result for an assistant turn to arrive together.
fn to_wire_messages(conversation: &[Turn]) -> Vec<ToolMessage> {
    let mut messages: Vec<ToolMessage> = Vec::new();

    for turn in conversation {
        match turn {
            Turn::User { text } => messages.push(ToolMessage {
                role: "user",
                content: vec![ToolMessageContent::Text { text: text.clone() }],
            }),
            Turn::Assistant { text, requests } => {
                let mut content = Vec::new();
                if let Some(text) = text.as_ref().filter(|t| !t.trim().is_empty()) {
                    content.push(ToolMessageContent::Text { text: text.clone() });
                }
                for request in requests {
                    content.push(ToolMessageContent::ToolUse {
                        id: request.id.clone(),
                        name: request.tool_name.clone(),
                        input: request.arguments.clone(),
                    });
                }
                if content.is_empty() {
                    content.push(ToolMessageContent::Text {
                        text: "(no response)".to_string(),
                    });
                }
                messages.push(ToolMessage {
                    role: "assistant",
                    content,
                });
            }
            Turn::ToolResult {
                request_id,
                content,
                is_error,
            } => {
                let block = ToolMessageContent::ToolResult {
                    tool_use_id: request_id.clone(),
                    content: content.clone(),
                    is_error: *is_error,
                };
                match messages.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && last
                                .content
                                .iter()
                                .all(|c| matches!(c, ToolMessageContent::ToolResult { .. })) =>
                    {
                        last.content.push(block)
                    }
                    _ => messages.push(ToolMessage {
                        role: "user",
                        content: vec![block],
                    }),
                }
            }
        }
    }

    messages
}

fn from_wire_response(response: ToolApiResponse) -> ReasonerReply {
    let usage = TokenUsage {
        input_tokens: response.usage.input_tokens,
        output_tokens: response.usage.output_tokens,
    };

    let mut texts = Vec::new();
    let mut requests = Vec::new();
    for block in response.content {
        match block {
            ContentBlockResponse::Text { text } => {
                if !text.trim().is_empty() {
                    texts.push(text);
                }
            }
            ContentBlockResponse::ToolUse { id, name, input } => requests.push(ToolRequest {
                id,
                tool_name: name,
                arguments: input,
            }),
            ContentBlockResponse::Other => {}
        }
    }

    let text = texts.join("\n").trim().to_string();
    let response = if requests.is_empty() {
        ReasonerResponse::Final { text }
    } else {
        ReasonerResponse::ToolRequests {
            text: if text.is_empty() { None } else { Some(text) },
            requests,
        }
    };

    ReasonerReply { response, usage }
}

#[async_trait]
impl Reasoner for AnthropicReasoner {
    async fn invoke(
        &self,
        system: &str,
        conversation: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<ReasonerReply, ReasonerError> {
        let request = ToolApiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: 0.0,
            system,
            messages: to_wire_messages(conversation),
            tools,
        };

        let response = self.send_request(&request).await?;
        tracing::debug!(
            "[Reasoner] {} stop_reason: {}",
            self.model,
            response.stop_reason.as_deref().unwrap_or("none")
        );

        Ok(from_wire_response(response))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
