//! Decision Loop
//!
//! Drives one file from analysis to a terminal answer:
//!
//! `Analyzing -> Reasoning -> (Terminal | Acting -> Reasoning -> ...)`
//!
//! The loop is bounded by `max_steps` reasoning turns. A session always ends
//! with a final text, including when the reasoner fails or the bound is hit.

use super::session::{LoopState, SessionOutcome, SessionState};
use crate::ai::prompts::{build_analysis_summary, build_session_request, build_sorting_system_prompt};
use crate::ai::{sorting_tools, Reasoner, ReasonerResponse, TokenUsage, ToolCall, Turn};
use crate::analyzer::RecursiveAnalyzer;
use crate::execution::ActionExecutor;
use crate::extract::{is_diagnostic, ContentExtractor, DocumentExtractor};
use crate::models::{ActionKind, ActionResult, RuleSet};
use crate::storage::{base_name, StorageBackend};
use crate::utils::{format_size, head_tail_sample};
use crate::vector::{MemoryHint, SimilarityMemory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    /// Reasoning turns before the session is cut off
    pub max_steps: usize,
    /// Extraction cap for the analyzing state; larger documents are
    /// head+tail sampled before analysis
    pub max_analysis_chars: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            max_analysis_chars: 200_000,
        }
    }
}

/// Result of the analyzing state
struct Analysis {
    summary: String,
    usage: TokenUsage,
}

pub struct Orchestrator {
    reasoner: Arc<dyn Reasoner>,
    analyzer: RecursiveAnalyzer,
    executor: ActionExecutor,
    memory: Arc<SimilarityMemory>,
    analysis_extractor: DocumentExtractor,
    config: LoopConfig,
}

impl Orchestrator {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        analyzer: RecursiveAnalyzer,
        executor: ActionExecutor,
        memory: Arc<SimilarityMemory>,
    ) -> Self {
        Self::with_config(reasoner, analyzer, executor, memory, LoopConfig::default())
    }

    pub fn with_config(
        reasoner: Arc<dyn Reasoner>,
        analyzer: RecursiveAnalyzer,
        executor: ActionExecutor,
        memory: Arc<SimilarityMemory>,
        config: LoopConfig,
    ) -> Self {
        Self {
            reasoner,
            analyzer,
            executor,
            memory,
            analysis_extractor: DocumentExtractor::new(config.max_analysis_chars),
            config,
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        self.executor.backend()
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Sort one file. Never fails; problems end up in the final text.
    pub async fn run_session(&self, target: &str, rule_set: RuleSet) -> SessionOutcome {
        let mut session = SessionState::new(target, rule_set);
        let mut usage = TokenUsage::default();
        let mut actions: Vec<ActionResult> = Vec::new();

        tracing::info!(
            "[AgentLoop] Session {} started for {} using '{}'",
            session.short_id(),
            target,
            session.rule_set.name
        );

        session.enter(LoopState::Analyzing);
        let analysis = self.analyze(target).await;
        usage.add(analysis.usage);
        session.analysis_summary = analysis.summary;

        let tools = sorting_tools(
            self.executor.supports_permissions(),
            self.executor.supports_folder_color(),
        );
        let system = build_sorting_system_prompt(&session.rule_set, &session.analysis_summary);
        session.push(Turn::user(build_session_request(target)));

        let mut steps = 0;
        let final_text = loop {
            if steps >= self.config.max_steps {
                tracing::warn!(
                    "[AgentLoop] Session {} hit the step limit ({})",
                    session.short_id(),
                    self.config.max_steps
                );
                session.enter(LoopState::Terminal);
                break format!(
                    "Stopped after {} reasoning steps without a final answer for {} ({} action(s) taken).",
                    self.config.max_steps,
                    target,
                    actions.len()
                );
            }

            session.enter(LoopState::Reasoning);
            steps += 1;
            let reply = match self
                .reasoner
                .invoke(&system, &session.conversation, &tools)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!("[AgentLoop] Session {} reasoner error: {}", session.short_id(), e);
                    session.enter(LoopState::Terminal);
                    break format!("Could not finish sorting {}: {}", target, e);
                }
            };
            usage.add(reply.usage);
            session.push(reply.response.to_turn());

            match reply.response {
                ReasonerResponse::Final { text } => {
                    session.enter(LoopState::Terminal);
                    break text;
                }
                ReasonerResponse::ToolRequests { requests, .. } => {
                    session.enter(LoopState::Acting);
                    for request in &requests {
                        let result = match ToolCall::decode(request) {
                            Ok(call) => self.executor.execute(&call).await,
                            Err(e) => {
                                tracing::warn!("[AgentLoop] Rejected tool request: {}", e);
                                ActionResult::failed(ActionKind::Invalid, e)
                            }
                        };
                        session.push(Turn::tool_result(
                            &request.id,
                            result.to_tool_content(),
                            !result.is_success(),
                        ));
                        actions.push(result);
                    }
                }
            }
        };

        tracing::info!(
            "[AgentLoop] Session {} finished after {} step(s), {} action(s), {} tokens",
            session.short_id(),
            steps,
            actions.len(),
            usage.total()
        );

        SessionOutcome {
            session_id: session.session_id,
            target: session.current_target,
            final_text,
            trace: session.trace,
            actions,
            usage,
            steps,
        }
    }

    /// Extract, analyze and consult memory
    async fn analyze(&self, target: &str) -> Analysis {
        let backend = self.executor.backend();
        let content = self.analysis_extractor.extract(backend.as_ref(), target).await;

        if is_diagnostic(&content) {
            tracing::warn!("[AgentLoop] No usable content for {}: {}", target, content);
            return Analysis {
                summary: build_analysis_summary(
                    base_name(target),
                    &content,
                    &MemoryHint::NoConfidentMatch.render(),
                ),
                usage: TokenUsage::default(),
            };
        }

        tracing::debug!(
            "[AgentLoop] Extracted {} of text from {}",
            format_size(content.len() as u64),
            target
        );

        let analysis = self.analyzer.analyze(&content, None).await;

        // Same bounded view the executor learns from
        let memory_view = head_tail_sample(&content, self.executor.extractor().max_chars());
        let hint = self.memory.query(&memory_view).await;

        Analysis {
            summary: build_analysis_summary(base_name(target), &analysis.summary, &hint.render()),
            usage: analysis.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::reasoner::testing::ScriptedReasoner;
    use crate::analyzer::AnalyzerConfig;
    use crate::storage::MemoryBackend;
    use crate::vector::MemoryConfig;
    use serde_json::json;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        memory: Arc<SimilarityMemory>,
        reasoner: Arc<ScriptedReasoner>,
    }

    impl Fixture {
        fn new(reasoner: ScriptedReasoner) -> Self {
            Self {
                backend: Arc::new(MemoryBackend::new()),
                memory: Arc::new(SimilarityMemory::in_memory(MemoryConfig::default())),
                reasoner: Arc::new(reasoner),
            }
        }

        fn orchestrator(&self, config: LoopConfig) -> Orchestrator {
            let analysis_reasoner = Arc::new(ScriptedReasoner::new(vec![]));
            let analyzer = RecursiveAnalyzer::new(
                analysis_reasoner.clone(),
                analysis_reasoner,
                AnalyzerConfig::default(),
            );
            let executor = ActionExecutor::new(self.backend.clone(), self.memory.clone());
            Orchestrator::with_config(
                self.reasoner.clone(),
                analyzer,
                executor,
                self.memory.clone(),
                config,
            )
        }
    }

    #[tokio::test]
    async fn test_final_answer_terminates_without_actions() {
        let fixture = Fixture::new(ScriptedReasoner::new(vec![ReasonerResponse::final_text(
            "Leaving notes.txt where it is.",
        )]));
        fixture.backend.insert("inbox/notes.txt", "misc notes");

        let outcome = fixture
            .orchestrator(LoopConfig::default())
            .run_session("inbox/notes.txt", RuleSet::default())
            .await;

        assert_eq!(
            outcome.trace,
            vec![LoopState::Analyzing, LoopState::Reasoning, LoopState::Terminal]
        );
        assert!(outcome.actions.is_empty());
        assert_eq!(outcome.final_text, "Leaving notes.txt where it is.");
        assert_eq!(outcome.steps, 1);
    }

    #[tokio::test]
    async fn test_invoice_is_moved_to_vendor_folder() {
        let fixture = Fixture::new(ScriptedReasoner::new(vec![
            ReasonerResponse::tool(
                "move_file",
                json!({"source_key": "inbox/invoice_1024.txt", "destination_folder": "Finance/Invoices/AWS"}),
            ),
            ReasonerResponse::final_text("Moved the AWS invoice to Finance/Invoices/AWS."),
        ]));
        fixture.backend.insert(
            "inbox/invoice_1024.txt",
            "INVOICE #1024\nVendor: AWS\nAmount due: $150.00",
        );

        let outcome = fixture
            .orchestrator(LoopConfig::default())
            .run_session("inbox/invoice_1024.txt", RuleSet::default())
            .await;

        assert_eq!(
            outcome.trace,
            vec![
                LoopState::Analyzing,
                LoopState::Reasoning,
                LoopState::Acting,
                LoopState::Reasoning,
                LoopState::Terminal
            ]
        );
        assert!(fixture
            .backend
            .exists("Finance/Invoices/AWS/invoice_1024.txt")
            .await
            .unwrap());
        assert_eq!(outcome.successful_actions().count(), 1);

        let system = &fixture.reasoner.system_prompts()[0];
        assert!(system.contains("FILE: invoice_1024.txt"));
        assert!(system.contains("Vendor: AWS"));
        assert!(system.contains("MEMORY HINTS: No high-confidence matches in memory."));

        // The move result was fed back before the second turn
        let second = &fixture.reasoner.conversations()[1];
        assert!(matches!(
            second.last(),
            Some(Turn::ToolResult { content, is_error: false, .. })
                if content == "Moved to Finance/Invoices/AWS/invoice_1024.txt"
        ));

        // The move taught the memory
        assert_eq!(
            fixture
                .memory
                .query("[TXT]: INVOICE #1024\nVendor: AWS\nAmount due: $150.00")
                .await
                .top()
                .map(|m| m.destination.clone()),
            Some("Finance/Invoices/AWS".to_string())
        );
    }

    #[tokio::test]
    async fn test_memory_hint_reaches_the_reasoner() {
        let fixture = Fixture::new(ScriptedReasoner::new(vec![ReasonerResponse::final_text("ok")]));
        fixture
            .memory
            .learn(
                "[TXT]: Project Alpha kickoff notes. Attendees: Dana, Lee. Next milestone in March.",
                "Projects/Alpha",
            )
            .await;
        fixture.backend.insert(
            "inbox/alpha_kickoff.txt",
            "Project Alpha kickoff notes. Attendees: Dana, Lee. Next milestone in March!",
        );

        fixture
            .orchestrator(LoopConfig::default())
            .run_session("inbox/alpha_kickoff.txt", RuleSet::default())
            .await;

        let system = &fixture.reasoner.system_prompts()[0];
        assert!(system.contains("Previously sorted to 'Projects/Alpha'"));
    }

    #[tokio::test]
    async fn test_step_limit_ends_session() {
        let fixture = Fixture::new(ScriptedReasoner::with_fallback(
            vec![],
            ReasonerResponse::tool("list_contents", json!({"prefix": ""})),
        ));
        fixture.backend.insert("inbox/a.txt", "a");

        let outcome = fixture
            .orchestrator(LoopConfig {
                max_steps: 3,
                ..LoopConfig::default()
            })
            .run_session("inbox/a.txt", RuleSet::default())
            .await;

        assert_eq!(fixture.reasoner.call_count(), 3);
        assert_eq!(outcome.actions.len(), 3);
        assert!(outcome.final_text.starts_with("Stopped after 3 reasoning steps"));
        assert_eq!(outcome.trace.last(), Some(&LoopState::Terminal));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_failed_result() {
        let fixture = Fixture::new(ScriptedReasoner::new(vec![
            ReasonerResponse::tool("delete_everything", json!({})),
            ReasonerResponse::final_text("Could not sort the file."),
        ]));
        fixture.backend.insert("inbox/a.txt", "a");

        let outcome = fixture
            .orchestrator(LoopConfig::default())
            .run_session("inbox/a.txt", RuleSet::default())
            .await;

        assert_eq!(outcome.actions.len(), 1);
        assert_eq!(outcome.actions[0].action_kind, ActionKind::Invalid);
        let second = &fixture.reasoner.conversations()[1];
        assert!(matches!(
            second.last(),
            Some(Turn::ToolResult { content, is_error: true, .. })
                if content == "FAILED (invalid): Unknown tool: delete_everything"
        ));
        assert!(fixture.backend.exists("inbox/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_reasoner_error_becomes_final_text() {
        let reasoner = ScriptedReasoner::new(vec![]);
        reasoner.push_error("connection refused");
        let fixture = Fixture::new(reasoner);
        fixture.backend.insert("inbox/a.txt", "a");

        let outcome = fixture
            .orchestrator(LoopConfig::default())
            .run_session("inbox/a.txt", RuleSet::default())
            .await;

        assert!(outcome.final_text.contains("connection refused"));
        assert_eq!(outcome.trace.last(), Some(&LoopState::Terminal));
    }

    #[tokio::test]
    async fn test_missing_file_still_reaches_reasoner() {
        let fixture = Fixture::new(ScriptedReasoner::new(vec![ReasonerResponse::final_text(
            "The file does not exist.",
        )]));

        let outcome = fixture
            .orchestrator(LoopConfig::default())
            .run_session("inbox/ghost.pdf", RuleSet::default())
            .await;

        assert_eq!(outcome.final_text, "The file does not exist.");
        assert!(fixture.reasoner.system_prompts()[0].contains("SUMMARY: [Error]"));
    }
}
