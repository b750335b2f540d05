//! One user's conversation.

use crate::capability::ToolInvocationRecord;
use crate::memory::ConversationState;
use crate::orchestrator::AnswerOrchestrator;
use policypro_core::{AppConfig, AppResult};
use policypro_llm::ChatMessage;
use std::sync::Arc;

/// Owns the conversation state and runs turns strictly in sequence.
pub struct Session {
    orchestrator: Arc<AnswerOrchestrator>,
    state: ConversationState,
    last_invocations: Vec<ToolInvocationRecord>,
}

impl Session {
    pub fn new(orchestrator: Arc<AnswerOrchestrator>) -> Self {
        Self {
            orchestrator,
            state: ConversationState::new(),
            last_invocations: Vec::new(),
        }
    }

    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let orchestrator = AnswerOrchestrator::from_config(config).await?;
        Ok(Self::new(Arc::new(orchestrator)))
    }

    /// Answer one message. On error the conversation is left as it was.
    pub async fn query(&mut self, text: &str) -> AppResult<String> {
        let outcome = self.orchestrator.answer(text, &self.state).await?;
        self.state = outcome.state;
        self.last_invocations = outcome.invocations;
        Ok(outcome.response)
    }

    /// Tools used by the last successful turn, in order.
    pub fn last_invocations(&self) -> &[ToolInvocationRecord] {
        &self.last_invocations
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.state.render()
    }

    pub fn reset(&mut self) {
        self.state = ConversationState::new();
        self.last_invocations.clear();
        tracing::debug!("Conversation reset");
    }
}
