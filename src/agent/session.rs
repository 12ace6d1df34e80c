//! Session state for one file

use crate::ai::{TokenUsage, Turn};
use crate::models::{ActionResult, RuleSet};
use serde::{Deserialize, Serialize};

/// States of the decision loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Analyzing,
    Reasoning,
    Acting,
    Terminal,
}

/// Owned by the orchestrator for the lifetime of one file
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    /// Append-only, causal order
    pub conversation: Vec<Turn>,
    pub rule_set: RuleSet,
    pub current_target: String,
    /// Set once by the analyzing state
    pub analysis_summary: String,
    pub trace: Vec<LoopState>,
}

impl SessionState {
    pub fn new(target: impl Into<String>, rule_set: RuleSet) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            conversation: Vec::new(),
            rule_set,
            current_target: target.into(),
            analysis_summary: String::new(),
            trace: Vec::new(),
        }
    }

    pub fn enter(&mut self, state: LoopState) {
        tracing::debug!("[AgentLoop] {} -> {:?}", self.short_id(), state);
        self.trace.push(state);
    }

    pub fn push(&mut self, turn: Turn) {
        self.conversation.push(turn);
    }

    /// First 8 characters of the session id, for log lines
    pub fn short_id(&self) -> &str {
        &self.session_id[..self.session_id.len().min(8)]
    }
}

/// What a finished session reports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub session_id: String,
    pub target: String,
    pub final_text: String,
    pub trace: Vec<LoopState>,
    pub actions: Vec<ActionResult>,
    pub usage: TokenUsage,
    /// Reasoning turns taken
    pub steps: usize,
}

impl SessionOutcome {
    pub fn successful_actions(&self) -> impl Iterator<Item = &ActionResult> {
        self.actions.iter().filter(|a| a.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_empty() {
        let mut session = SessionState::new("inbox/a.txt", RuleSet::default());
        assert!(session.conversation.is_empty());
        assert_eq!(session.short_id().len(), 8);

        session.enter(LoopState::Analyzing);
        session.push(Turn::user("Sort this file: inbox/a.txt"));
        assert_eq!(session.trace, vec![LoopState::Analyzing]);
        assert_eq!(session.conversation.len(), 1);
    }
}
