//! Conversation memory with progressive summarization.
//!
//! Recent messages are kept verbatim. Once the token cost of the summary
//! plus those messages exceeds the ceiling, the oldest messages are folded
//! into a rolling summary written by the completion service.

use policypro_core::{AppError, AppResult};
use policypro_llm::{ChatMessage, LlmClient, LlmRequest, Role};
use policypro_prompt::{PromptLibrary, MEMORY_SUMMARIZE};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Fixed token cost added for every message, summary included.
pub const MESSAGE_OVERHEAD: usize = 4;

/// Conversation history of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
    summary: Option<String>,
    token_count: usize,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unsummarized messages, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Token estimate of summary plus unsummarized messages, as of the last
    /// memory operation.
    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.summary.is_none()
    }

    /// History as sent to the model: the summary as one system message,
    /// then the unsummarized messages in order.
    pub fn render(&self) -> Vec<ChatMessage> {
        let mut rendered = Vec::with_capacity(self.messages.len() + 1);
        if let Some(summary) = &self.summary {
            rendered.push(ChatMessage::system(summary.clone()));
        }
        rendered.extend(self.messages.iter().cloned());
        rendered
    }
}

/// Approximate token count of a piece of text.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// cl100k BPE token counter.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// # Errors
    /// `Config` if the tokenizer tables cannot be loaded.
    pub fn new() -> AppResult<Self> {
        let bpe = cl100k_base()
            .map_err(|e| AppError::Config(format!("Failed to load tokenizer: {}", e)))?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Writes the rolling summary.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    /// Extend `previous` with the content of `new_lines`.
    async fn summarize(
        &self,
        previous: Option<&str>,
        new_lines: &[ChatMessage],
    ) -> AppResult<String>;
}

/// Summarizer backed by the completion service and the
/// `memory.summarize` prompt.
pub struct LlmSummarizer {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    model: String,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLibrary>, model: impl Into<String>) -> Self {
        Self {
            llm,
            prompts,
            model: model.into(),
        }
    }
}

fn transcript(lines: &[ChatMessage]) -> String {
    lines
        .iter()
        .filter(|m| !m.content.is_empty())
        .map(|m| {
            let speaker = match m.role {
                Role::User => "Usuario",
                Role::Assistant => "Asistente",
                Role::System => "Sistema",
                Role::Tool => "Herramienta",
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait::async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        previous: Option<&str>,
        new_lines: &[ChatMessage],
    ) -> AppResult<String> {
        let lines = transcript(new_lines);
        let prompt = self.prompts.render(
            MEMORY_SUMMARIZE,
            &[("summary", previous.unwrap_or("")), ("new_lines", &lines)],
        )?;

        let request = LlmRequest::new(self.model.clone(), vec![ChatMessage::user(prompt)])
            .with_temperature(0.0);
        let response = self.llm.complete(&request).await?;

        tracing::debug!(
            lines = new_lines.len(),
            chars = response.content.len(),
            "Updated conversation summary"
        );
        Ok(response.content.trim().to_string())
    }
}

/// Applies the token ceiling to a [`ConversationState`].
pub struct ConversationMemory {
    counter: Arc<dyn TokenCounter>,
    summarizer: Arc<dyn Summarizer>,
    max_token_limit: usize,
}

impl ConversationMemory {
    pub fn new(
        counter: Arc<dyn TokenCounter>,
        summarizer: Arc<dyn Summarizer>,
        max_token_limit: usize,
    ) -> Self {
        Self {
            counter,
            summarizer,
            max_token_limit,
        }
    }

    pub fn max_token_limit(&self) -> usize {
        self.max_token_limit
    }

    pub fn message_cost(&self, message: &ChatMessage) -> usize {
        self.counter.count(&message.content) + MESSAGE_OVERHEAD
    }

    fn summary_cost(&self, summary: Option<&str>) -> usize {
        summary.map_or(0, |s| self.counter.count(s) + MESSAGE_OVERHEAD)
    }

    fn buffer_cost<'a>(&self, messages: impl IntoIterator<Item = &'a ChatMessage>) -> usize {
        messages.into_iter().map(|m| self.message_cost(m)).sum()
    }

    /// Token cost of summary plus unsummarized messages.
    pub fn cost(&self, state: &ConversationState) -> usize {
        self.summary_cost(state.summary()) + self.buffer_cost(&state.messages)
    }

    /// Append one message, compressing if the ceiling is crossed.
    pub async fn append(&self, state: &mut ConversationState, message: ChatMessage) -> AppResult<()> {
        self.append_all(state, vec![message]).await
    }

    /// Append messages in order, then compress once.
    pub async fn append_all(
        &self,
        state: &mut ConversationState,
        messages: Vec<ChatMessage>,
    ) -> AppResult<()> {
        state.messages.extend(messages);
        self.compress(state).await?;
        Ok(())
    }

    /// Fold the oldest messages into the summary until the total cost is
    /// below the ceiling. Returns whether anything changed.
    ///
    /// A no-op at or under the ceiling. On error `state` is left untouched.
    pub async fn compress(&self, state: &mut ConversationState) -> AppResult<bool> {
        let limit = self.max_token_limit;
        let before = self.cost(state);
        if before <= limit {
            state.token_count = before;
            return Ok(false);
        }

        let mut buffer: VecDeque<ChatMessage> = state.messages.iter().cloned().collect();
        let mut summary = state.summary.clone();

        let mut pruned = Vec::new();
        while !buffer.is_empty() && self.buffer_cost(&buffer) > limit / 2 {
            if let Some(message) = buffer.pop_front() {
                pruned.push(message);
            }
        }
        if !pruned.is_empty() {
            summary = Some(self.fold(summary.as_deref(), &pruned).await?);
        }

        while self.summary_cost(summary.as_deref()) + self.buffer_cost(&buffer) >= limit {
            match buffer.pop_front() {
                Some(message) => {
                    pruned.push(message.clone());
                    summary =
                        Some(self.fold(summary.as_deref(), std::slice::from_ref(&message)).await?);
                }
                None => {
                    summary = summary
                        .map(|s| self.truncate(&s, limit.saturating_sub(MESSAGE_OVERHEAD + 1)))
                        .filter(|s| !s.is_empty());
                    break;
                }
            }
        }

        state.messages = buffer.into();
        state.summary = summary;
        state.token_count = self.cost(state);

        tracing::info!(
            pruned = pruned.len(),
            kept = state.messages.len(),
            tokens_before = before,
            tokens_after = state.token_count,
            "Compressed conversation memory"
        );
        Ok(true)
    }

    /// Summary of `summary` plus `lines`. An empty result is an upstream
    /// failure.
    async fn fold(&self, summary: Option<&str>, lines: &[ChatMessage]) -> AppResult<String> {
        let updated = self.summarizer.summarize(summary, lines).await?;
        let updated = updated.trim();
        if updated.is_empty() {
            return Err(AppError::Upstream(
                "Summarizer returned an empty summary".to_string(),
            ));
        }
        Ok(updated.to_string())
    }

    /// Longest prefix of `text` within `budget` tokens.
    fn truncate(&self, text: &str, budget: usize) -> String {
        if self.counter.count(text) <= budget {
            return text.to_string();
        }

        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        // bounds[lo] fits, bounds[hi] does not
        let (mut lo, mut hi) = (0, bounds.len() - 1);
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.counter.count(&text[..bounds[mid]]) <= budget {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        text[..bounds[lo]].to_string()
    }
}
