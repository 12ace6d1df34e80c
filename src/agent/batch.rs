//! Batch Runner
//!
//! Sorts a single file or every direct child of a container, one session at
//! a time, pausing between files to stay under provider rate limits.

use super::agent_loop::Orchestrator;
use crate::models::RuleSet;
use crate::storage::base_name;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    /// Pause between files
    pub inter_file_delay: Duration,
    /// Per-session cap; `None` lets sessions run to completion
    pub session_timeout: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            inter_file_delay: Duration::from_secs(10),
            session_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    /// A file or a container
    pub target: String,
    #[serde(default)]
    pub rule_set: Option<RuleSet>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// A container was processed
    BatchComplete,
    /// A single file was processed
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub status: BatchStatus,
    pub processed_count: usize,
    pub result: String,
}

pub struct BatchRunner {
    orchestrator: Orchestrator,
    default_rule_set: RuleSet,
    config: BatchConfig,
}

impl BatchRunner {
    pub fn new(orchestrator: Orchestrator, default_rule_set: RuleSet, config: BatchConfig) -> Self {
        Self {
            orchestrator,
            default_rule_set,
            config,
        }
    }

    pub async fn run(&self, request: BatchRequest) -> BatchResponse {
        let rule_set = request
            .rule_set
            .unwrap_or_else(|| self.default_rule_set.clone());
        let target = request.target.trim().trim_end_matches('/');
        let backend = self.orchestrator.backend();

        let is_container = match backend.is_container(target).await {
            Ok(is_container) => is_container,
            Err(e) => {
                tracing::error!("[Batch] Could not inspect {}: {}", target, e);
                return BatchResponse {
                    status: BatchStatus::Complete,
                    processed_count: 0,
                    result: format!("Could not inspect {}: {}", target, e),
                };
            }
        };

        if !is_container {
            let final_text = self.run_one(target, &rule_set).await;
            return BatchResponse {
                status: BatchStatus::Complete,
                processed_count: 1,
                result: final_text,
            };
        }

        let files = match backend.list(target).await {
            Ok(files) => files,
            Err(e) => {
                tracing::error!("[Batch] Could not list {}: {}", target, e);
                return BatchResponse {
                    status: BatchStatus::BatchComplete,
                    processed_count: 0,
                    result: format!("Could not list {}: {}", target, e),
                };
            }
        };

        // The container's own marker object (e.g. `inbox/` in a bucket) is not a file
        let files: Vec<String> = files
            .into_iter()
            .filter(|f| !f.ends_with('/') && f.trim_end_matches('/') != target)
            .collect();

        tracing::info!("[Batch] {} file(s) in {}", files.len(), if target.is_empty() { "(root)" } else { target });

        let mut results = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            if index > 0 && !self.config.inter_file_delay.is_zero() {
                tracing::debug!("[Batch] Waiting {:?} before the next file", self.config.inter_file_delay);
                tokio::time::sleep(self.config.inter_file_delay).await;
            }
            tracing::info!("[Batch] ({}/{}) {}", index + 1, files.len(), file);
            let final_text = self.run_one(file, &rule_set).await;
            results.push(format!("{}: {}", base_name(file), final_text));
        }

        BatchResponse {
            status: BatchStatus::BatchComplete,
            processed_count: files.len(),
            result: results.join("\n"),
        }
    }

    async fn run_one(&self, file: &str, rule_set: &RuleSet) -> String {
        let session = self.orchestrator.run_session(file, rule_set.clone());
        match self.config.session_timeout {
            Some(limit) => match tokio::time::timeout(limit, session).await {
                Ok(outcome) => outcome.final_text,
                Err(_) => {
                    tracing::warn!("[Batch] Session for {} timed out after {:?}", file, limit);
                    format!("Timed out after {}s", limit.as_secs_f32())
                }
            },
            None => session.await.final_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::LoopConfig;
    use crate::ai::reasoner::testing::ScriptedReasoner;
    use crate::ai::{Reasoner, ReasonerError, ReasonerReply, ReasonerResponse, ToolDefinition, Turn};
    use crate::analyzer::{AnalyzerConfig, RecursiveAnalyzer};
    use crate::execution::ActionExecutor;
    use crate::storage::MemoryBackend;
    use crate::vector::{MemoryConfig, SimilarityMemory};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StalledReasoner;

    #[async_trait]
    impl Reasoner for StalledReasoner {
        async fn invoke(
            &self,
            _system: &str,
            _conversation: &[Turn],
            _tools: &[ToolDefinition],
        ) -> Result<ReasonerReply, ReasonerError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ReasonerResponse::final_text("too late").into())
        }

        fn model(&self) -> &str {
            "stalled"
        }
    }

    fn runner(backend: Arc<MemoryBackend>, reasoner: Arc<dyn Reasoner>, config: BatchConfig) -> BatchRunner {
        let memory = Arc::new(SimilarityMemory::in_memory(MemoryConfig::default()));
        let analysis = Arc::new(ScriptedReasoner::new(vec![]));
        let orchestrator = Orchestrator::with_config(
            reasoner,
            RecursiveAnalyzer::new(analysis.clone(), analysis, AnalyzerConfig::default()),
            ActionExecutor::new(backend, memory.clone()),
            memory,
            LoopConfig::default(),
        );
        BatchRunner::new(orchestrator, RuleSet::default(), config)
    }

    fn no_delay() -> BatchConfig {
        BatchConfig {
            inter_file_delay: Duration::ZERO,
            session_timeout: None,
        }
    }

    #[tokio::test]
    async fn test_container_is_processed_file_by_file() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("inbox/a.txt", "alpha");
        backend.insert("inbox/b.txt", "beta");
        backend.insert("inbox/nested/c.txt", "not a direct child");
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            ReasonerResponse::final_text("kept a"),
            ReasonerResponse::final_text("kept b"),
        ]));

        let response = runner(backend, reasoner.clone(), no_delay())
            .run(BatchRequest {
                target: "inbox/".to_string(),
                rule_set: None,
            })
            .await;

        assert_eq!(response.status, BatchStatus::BatchComplete);
        assert_eq!(response.processed_count, 2);
        assert_eq!(response.result, "a.txt: kept a\nb.txt: kept b");
        assert_eq!(reasoner.call_count(), 2);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "batch_complete");
        assert_eq!(json["processed_count"], 2);
    }

    #[tokio::test]
    async fn test_single_file_request() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("inbox/a.txt", "alpha");
        let reasoner = Arc::new(ScriptedReasoner::new(vec![ReasonerResponse::final_text("done")]));

        let custom = RuleSet::new("Tiny", vec!["Everything goes to Misc".to_string()]);
        let response = runner(backend, reasoner.clone(), no_delay())
            .run(BatchRequest {
                target: "inbox/a.txt".to_string(),
                rule_set: Some(custom),
            })
            .await;

        assert_eq!(response.status, BatchStatus::Complete);
        assert_eq!(response.processed_count, 1);
        assert_eq!(response.result, "done");
        assert!(reasoner.system_prompts()[0].contains("Everything goes to Misc"));
    }

    #[tokio::test]
    async fn test_session_timeout_is_reported() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("inbox/a.txt", "alpha");
        let config = BatchConfig {
            inter_file_delay: Duration::ZERO,
            session_timeout: Some(Duration::from_millis(50)),
        };

        let response = runner(backend, Arc::new(StalledReasoner), config)
            .run(BatchRequest {
                target: "inbox".to_string(),
                rule_set: None,
            })
            .await;

        assert_eq!(response.processed_count, 1);
        assert!(response.result.starts_with("a.txt: Timed out"));
    }
}
