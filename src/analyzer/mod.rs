//! Recursive Analyzer
//!
//! Produces a bounded summary of arbitrarily large content. Small content is
//! summarized directly. Larger content runs a bounded planner sub-session
//! that splits the document and fans out per-chunk sub-queries to a cheaper
//! reasoner, then synthesizes a structured digest. Overrunning the turn cap,
//! or any planner error, falls back to a head+tail sample.

pub mod tools;

use crate::ai::json_parser::extract_json;
use crate::ai::prompts::{
    build_analyzer_system_prompt, build_chunk_prompt, CHUNK_SYSTEM_PROMPT, DEFAULT_ANALYSIS_TASK,
};
use crate::ai::{Reasoner, ReasonerResponse, TokenUsage, ToolDefinition, ToolRequest, Turn};
use crate::utils::{head_tail_sample, preview};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tools::{analyzer_tools, AnalyzerToolCall, SplitStrategy};

/// Configuration for the recursive analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerConfig {
    /// Content at or below this size skips the sub-session
    pub direct_threshold_chars: usize,
    /// Hard cap on planner turns
    pub max_turns: usize,
    pub max_summary_chars: usize,
    pub max_parallel_subqueries: usize,
    /// Chunk size used when the planner does not choose one
    pub default_chunk_chars: usize,
    /// Smaller requested chunk sizes are raised to this
    pub min_chunk_chars: usize,
    /// Upper bound on chunks per split and sub-queries per summarize call
    pub max_chunks: usize,
    pub max_peek_chars: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            direct_threshold_chars: 4000,
            max_turns: 25,
            max_summary_chars: 2000,
            max_parallel_subqueries: 4,
            default_chunk_chars: 3000,
            min_chunk_chars: 500,
            max_chunks: 64,
            max_peek_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    /// Small enough to summarize without reasoning calls
    Direct,
    /// Planner sub-session completed
    Recursive,
    /// Turn cap or planner failure; head+tail sample
    Fallback,
}

/// Structured digest requested from the planner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentDigest {
    #[serde(default)]
    pub document_type: String,
    #[serde(default)]
    pub project_identifiers: Vec<String>,
    #[serde(default)]
    pub key_entities: Vec<String>,
    #[serde(default)]
    pub overview: String,
}

impl DocumentDigest {
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        if !self.document_type.is_empty() {
            lines.push(format!("Type: {}", self.document_type));
        }
        if !self.project_identifiers.is_empty() {
            lines.push(format!("Projects: {}", self.project_identifiers.join(", ")));
        }
        if !self.key_entities.is_empty() {
            lines.push(format!("Entities: {}", self.key_entities.join(", ")));
        }
        if !self.overview.is_empty() {
            lines.push(format!("Overview: {}", self.overview));
        }
        lines.join("\n")
    }

    fn is_empty(&self) -> bool {
        self.document_type.is_empty()
            && self.project_identifiers.is_empty()
            && self.key_entities.is_empty()
            && self.overview.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub summary: String,
    pub method: AnalysisMethod,
    pub digest: Option<DocumentDigest>,
    pub usage: TokenUsage,
    /// Planner turns used (0 for direct analysis)
    pub turns: usize,
}

pub struct RecursiveAnalyzer {
    planner: Arc<dyn Reasoner>,
    sub_reasoner: Arc<dyn Reasoner>,
    config: AnalyzerConfig,
}

/// Mutable state of one planner sub-session
struct SubSession<'a> {
    content: &'a str,
    chunks: Vec<String>,
    usage: TokenUsage,
}

impl RecursiveAnalyzer {
    pub fn new(planner: Arc<dyn Reasoner>, sub_reasoner: Arc<dyn Reasoner>, config: AnalyzerConfig) -> Self {
        Self {
            planner,
            sub_reasoner,
            config,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Summarize `content` for `task` (default: type, projects, entities, overview)
    pub async fn analyze(&self, content: &str, task: Option<&str>) -> AnalysisOutput {
        let total_chars = content.chars().count();
        if total_chars <= self.config.direct_threshold_chars {
            return AnalysisOutput {
                summary: head_tail_sample(content, self.config.max_summary_chars),
                method: AnalysisMethod::Direct,
                digest: None,
                usage: TokenUsage::default(),
                turns: 0,
            };
        }

        let task = task.unwrap_or(DEFAULT_ANALYSIS_TASK);
        tracing::info!("[Analyzer] Recursive analysis of {} chars", total_chars);

        let output = self.run_sub_session(content, total_chars, task).await;
        tracing::info!(
            "[Analyzer] {:?} after {} turn(s), tokens in={} out={}",
            output.method,
            output.turns,
            output.usage.input_tokens,
            output.usage.output_tokens
        );
        output
    }

    async fn run_sub_session(&self, content: &str, total_chars: usize, task: &str) -> AnalysisOutput {
        let system = build_analyzer_system_prompt(task, total_chars, self.config.max_summary_chars);
        let tools = analyzer_tools();
        let mut session = SubSession {
            content,
            chunks: Vec::new(),
            usage: TokenUsage::default(),
        };
        let mut conversation = vec![Turn::user(format!(
            "Analyze the document ({} characters). Task: {}",
            total_chars, task
        ))];

        for turn in 1..=self.config.max_turns {
            let reply = match self.planner.invoke(&system, &conversation, &tools).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::warn!("[Analyzer] Planner failed on turn {}: {}", turn, e);
                    return self.fallback(content, session.usage, turn);
                }
            };
            session.usage.add(reply.usage);
            conversation.push(reply.response.to_turn());

            match reply.response {
                ReasonerResponse::Final { text } => {
                    return match self.finish(&text) {
                        Some((summary, digest)) => AnalysisOutput {
                            summary,
                            method: AnalysisMethod::Recursive,
                            digest,
                            usage: session.usage,
                            turns: turn,
                        },
                        None => self.fallback(content, session.usage, turn),
                    };
                }
                ReasonerResponse::ToolRequests { requests, .. } => {
                    for request in &requests {
                        let (result, is_error) = self.execute(&mut session, request).await;
                        conversation.push(Turn::tool_result(&request.id, result, is_error));
                    }
                }
            }
        }

        tracing::warn!(
            "[Analyzer] Turn cap ({}) reached without a final answer",
            self.config.max_turns
        );
        self.fallback(content, session.usage, self.config.max_turns)
    }

    /// Final planner text to (summary, digest); None when empty
    fn finish(&self, text: &str) -> Option<(String, Option<DocumentDigest>)> {
        if text.trim().is_empty() {
            return None;
        }
        match extract_json::<DocumentDigest>(text) {
            Ok(digest) if !digest.is_empty() => Some((
                preview(&digest.render(), self.config.max_summary_chars),
                Some(digest),
            )),
            _ => Some((preview(text.trim(), self.config.max_summary_chars), None)),
        }
    }

    fn fallback(&self, content: &str, usage: TokenUsage, turns: usize) -> AnalysisOutput {
        AnalysisOutput {
            summary: head_tail_sample(content, self.config.max_summary_chars),
            method: AnalysisMethod::Fallback,
            digest: None,
            usage,
            turns,
        }
    }

    async fn execute(&self, session: &mut SubSession<'_>, request: &ToolRequest) -> (String, bool) {
        let call = match AnalyzerToolCall::decode(request) {
            Ok(call) => call,
            Err(e) => return (e, true),
        };

        match call {
            AnalyzerToolCall::ContentLength {} => (
                format!(
                    "{} characters, {} lines",
                    session.content.chars().count(),
                    session.content.lines().count()
                ),
                false,
            ),
            AnalyzerToolCall::SplitContent {
                strategy,
                max_chunk_chars,
            } => {
                let size = max_chunk_chars
                    .unwrap_or(self.config.default_chunk_chars)
                    .max(self.config.min_chunk_chars);
                let chunks = strategy.split(session.content, size);
                let limit = self.max_chunks();
                if chunks.len() > limit {
                    let suggested = session.content.chars().count().div_ceil(limit);
                    return (
                        format!(
                            "Split would produce {} chunks (limit {}); use max_chunk_chars of at least {}",
                            chunks.len(),
                            limit,
                            suggested.max(size * 2)
                        ),
                        true,
                    );
                }
                session.chunks = chunks;
                let sizes: Vec<String> = session
                    .chunks
                    .iter()
                    .map(|c| c.chars().count().to_string())
                    .collect();
                (
                    format!("{} chunks, sizes: [{}]", session.chunks.len(), sizes.join(", ")),
                    false,
                )
            }
            AnalyzerToolCall::SummarizeChunks { instruction, indices } => {
                if session.chunks.is_empty() {
                    session.chunks = self.default_split(session.content);
                }
                self.summarize_chunks(session, &instruction, indices).await
            }
            AnalyzerToolCall::Peek { start, len } => {
                let len = len
                    .unwrap_or(self.config.max_peek_chars)
                    .min(self.config.max_peek_chars);
                let slice: String = session.content.chars().skip(start).take(len).collect();
                if slice.is_empty() {
                    (format!("Offset {} is past the end of the document", start), true)
                } else {
                    (slice, false)
                }
            }
        }
    }

    fn max_chunks(&self) -> usize {
        self.config.max_chunks.max(1)
    }

    /// Paragraph split at the default size, doubled until it fits `max_chunks`
    fn default_split(&self, content: &str) -> Vec<String> {
        let total_chars = content.chars().count().max(1);
        let mut size = self.config.default_chunk_chars.max(self.config.min_chunk_chars).max(1);
        loop {
            let chunks = SplitStrategy::Paragraphs.split(content, size);
            if chunks.len() <= self.max_chunks() || size >= total_chars {
                return chunks;
            }
            size = size.saturating_mul(2);
        }
    }

    async fn summarize_chunks(
        &self,
        session: &mut SubSession<'_>,
        instruction: &str,
        indices: Option<Vec<usize>>,
    ) -> (String, bool) {
        let total = session.chunks.len();
        let indices: Vec<usize> = match indices {
            Some(list) => {
                let invalid: Vec<usize> = list.iter().copied().filter(|i| *i >= total).collect();
                if !invalid.is_empty() {
                    return (
                        format!("Chunk indices out of range (0..{}): {:?}", total, invalid),
                        true,
                    );
                }
                list
            }
            None => (0..total).collect(),
        };
        if indices.is_empty() {
            return ("No chunks to summarize".to_string(), true);
        }
        if indices.len() > self.max_chunks() {
            return (
                format!(
                    "{} sub-queries requested (limit {} per call); pass fewer indices",
                    indices.len(),
                    self.max_chunks()
                ),
                true,
            );
        }

        let chunks = &session.chunks;
        let sub = &self.sub_reasoner;
        let results: Vec<(usize, Result<(String, TokenUsage), String>)> = stream::iter(indices)
            .map(|i| {
                let prompt = build_chunk_prompt(instruction, i, total, &chunks[i]);
                async move {
                    let outcome = sub
                        .invoke(CHUNK_SYSTEM_PROMPT, &[Turn::user(prompt)], &[] as &[ToolDefinition])
                        .await
                        .map(|reply| {
                            let text = match reply.response {
                                ReasonerResponse::Final { text } => text,
                                ReasonerResponse::ToolRequests { text, .. } => text.unwrap_or_default(),
                            };
                            (text, reply.usage)
                        })
                        .map_err(|e| e.to_string());
                    (i, outcome)
                }
            })
            .buffered(self.config.max_parallel_subqueries.max(1))
            .collect()
            .await;

        let mut lines = Vec::with_capacity(results.len());
        for (i, outcome) in results {
            match outcome {
                Ok((text, usage)) => {
                    session.usage.add(usage);
                    lines.push(format!("[chunk {}] {}", i, text.trim()));
                }
                Err(e) => {
                    tracing::warn!("[Analyzer] Sub-query for chunk {} failed: {}", i, e);
                    lines.push(format!("[chunk {}] FAILED: {}", i, e));
                }
            }
        }
        (lines.join("\n"), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::reasoner::testing::ScriptedReasoner;
    use serde_json::json;

    fn large_document() -> String {
        let mut doc = String::from("PROJECT PHOENIX - Quarterly Technical Audit\n\n");
        for i in 0..200 {
            doc.push_str(&format!(
                "Section {}: the Phoenix migration moved service {} to the new cluster without incident.\n\n",
                i, i
            ));
        }
        doc.push_str("Signed: Engineering Audit Board");
        doc
    }

    fn analyzer(planner: Arc<ScriptedReasoner>, sub: Arc<ScriptedReasoner>, config: AnalyzerConfig) -> RecursiveAnalyzer {
        RecursiveAnalyzer::new(planner, sub, config)
    }

    #[tokio::test]
    async fn test_small_content_is_direct() {
        let planner = Arc::new(ScriptedReasoner::new(vec![]));
        let sub = Arc::new(ScriptedReasoner::new(vec![]));
        let output = analyzer(planner.clone(), sub, AnalyzerConfig::default())
            .analyze("INVOICE #1024\nVendor: AWS\nTotal: $150.00", None)
            .await;

        assert_eq!(output.method, AnalysisMethod::Direct);
        assert_eq!(output.summary, "INVOICE #1024\nVendor: AWS\nTotal: $150.00");
        assert_eq!(planner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_always_requesting_planner_stops_at_cap() {
        let planner = Arc::new(ScriptedReasoner::with_fallback(
            vec![],
            ReasonerResponse::tool("summarize_chunks", json!({"instruction": "more detail"})),
        ));
        let sub = Arc::new(ScriptedReasoner::with_fallback(
            vec![],
            ReasonerResponse::final_text("partial"),
        ));
        let config = AnalyzerConfig {
            max_turns: 5,
            ..AnalyzerConfig::default()
        };
        let doc = large_document();

        let output = analyzer(planner.clone(), sub, config).analyze(&doc, None).await;

        assert_eq!(output.method, AnalysisMethod::Fallback);
        assert_eq!(planner.call_count(), 5);
        assert_eq!(output.turns, 5);
        assert!(output.summary.starts_with("PROJECT PHOENIX"));
        assert!(output.summary.ends_with("Signed: Engineering Audit Board"));
        assert!(output.summary.chars().count() < doc.chars().count());
    }

    #[tokio::test]
    async fn test_recursive_digest() {
        let planner = Arc::new(ScriptedReasoner::new(vec![
            ReasonerResponse::tool("split_content", json!({"strategy": "paragraphs", "max_chunk_chars": 4000})),
            ReasonerResponse::tool("summarize_chunks", json!({"instruction": "Which project and entities?", "indices": [0, 1]})),
            ReasonerResponse::final_text(
                r#"```json
{"document_type": "audit report", "project_identifiers": ["Phoenix"], "key_entities": ["Engineering Audit Board"], "overview": "Quarterly technical audit of the Phoenix migration. No incidents."}
```"#,
            ),
        ]));
        let sub = Arc::new(ScriptedReasoner::new(vec![
            ReasonerResponse::final_text("Project Phoenix migration notes."),
            ReasonerResponse::final_text("Project Phoenix migration notes."),
        ]));

        let output = analyzer(planner.clone(), sub.clone(), AnalyzerConfig::default())
            .analyze(&large_document(), None)
            .await;

        assert_eq!(output.method, AnalysisMethod::Recursive);
        assert_eq!(output.turns, 3);
        assert_eq!(sub.call_count(), 2);
        let digest = output.digest.unwrap();
        assert_eq!(digest.project_identifiers, vec!["Phoenix"]);
        assert!(output.summary.contains("Type: audit report"));
        assert!(output.summary.contains("Projects: Phoenix"));
        // 3 planner turns + 2 sub-queries at 15 tokens each
        assert_eq!(output.usage.total(), 75);

        // Chunk summaries were fed back to the planner
        let third_call = &planner.conversations()[2];
        let fed_back = third_call.iter().any(|t| match t {
            Turn::ToolResult { content, .. } => content.contains("[chunk 1] Project Phoenix"),
            _ => false,
        });
        assert!(fed_back);
    }

    #[tokio::test]
    async fn test_planner_error_falls_back() {
        let planner = Arc::new(ScriptedReasoner::new(vec![]));
        planner.push_error("connection reset");
        let sub = Arc::new(ScriptedReasoner::new(vec![]));

        let output = analyzer(planner, sub, AnalyzerConfig::default())
            .analyze(&large_document(), None)
            .await;
        assert_eq!(output.method, AnalysisMethod::Fallback);
    }

    #[tokio::test]
    async fn test_tiny_chunks_cannot_multiply_subqueries() {
        let planner = Arc::new(ScriptedReasoner::new(vec![
            ReasonerResponse::tool("split_content", json!({"strategy": "fixed", "max_chunk_chars": 1})),
            ReasonerResponse::tool("summarize_chunks", json!({"instruction": "everything"})),
            ReasonerResponse::tool(
                "summarize_chunks",
                json!({"instruction": "again", "indices": vec![0; 20]}),
            ),
            ReasonerResponse::final_text("Audit of Project Phoenix."),
        ]));
        let sub = Arc::new(ScriptedReasoner::with_fallback(
            vec![],
            ReasonerResponse::final_text("partial"),
        ));
        let config = AnalyzerConfig {
            min_chunk_chars: 100,
            max_chunks: 8,
            ..AnalyzerConfig::default()
        };
        let doc = "x".repeat(6000);

        let output = analyzer(planner.clone(), sub.clone(), config).analyze(&doc, None).await;

        assert_eq!(output.method, AnalysisMethod::Recursive);
        assert!(sub.call_count() <= 8, "{} sub-queries", sub.call_count());
        assert!(sub.call_count() > 0);

        let conversations = planner.conversations();
        let split_rejected = conversations[1].iter().any(|t| {
            matches!(t, Turn::ToolResult { is_error: true, content, .. } if content.contains("limit 8"))
        });
        assert!(split_rejected);
        let duplicates_rejected = conversations[3].iter().any(|t| {
            matches!(t, Turn::ToolResult { is_error: true, content, .. } if content.contains("20 sub-queries requested"))
        });
        assert!(duplicates_rejected);
    }

    #[tokio::test]
    async fn test_bad_tool_calls_are_reported_not_fatal() {
        let planner = Arc::new(ScriptedReasoner::new(vec![
            ReasonerResponse::tool("summarize_chunks", json!({"instruction": "x", "indices": [999]})),
            ReasonerResponse::final_text("A long audit report about Project Phoenix."),
        ]));
        let sub = Arc::new(ScriptedReasoner::new(vec![]));

        let output = analyzer(planner.clone(), sub, AnalyzerConfig::default())
            .analyze(&large_document(), None)
            .await;

        assert_eq!(output.method, AnalysisMethod::Recursive);
        assert_eq!(output.summary, "A long audit report about Project Phoenix.");
        let error_reported = planner.conversations()[1].iter().any(|t| {
            matches!(t, Turn::ToolResult { is_error: true, content, .. } if content.contains("out of range"))
        });
        assert!(error_reported);
    }
}
