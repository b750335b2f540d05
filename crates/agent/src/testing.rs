//! Hand-written doubles shared by the agent tests.

use crate::memory::{ConversationMemory, Summarizer, TokenCounter};
use crate::web_search::WebSearch;
use policypro_core::{AppError, AppResult};
use policypro_knowledge::{DocumentFragment, DocumentRetriever, ScoredFragment};
use policypro_llm::{ChatMessage, LlmClient, LlmRequest, LlmResponse, ToolCall};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One token per whitespace-separated word.
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/// Returns a short summary naming how many lines it has seen so far.
#[derive(Default)]
pub struct CountingSummarizer {
    lines: Mutex<usize>,
}

#[async_trait::async_trait]
impl Summarizer for CountingSummarizer {
    async fn summarize(&self, _previous: Option<&str>, new_lines: &[ChatMessage]) -> AppResult<String> {
        let mut lines = self.lines.lock().unwrap();
        *lines += new_lines.len();
        Ok(format!("Resumen de {} mensajes anteriores", *lines))
    }
}

impl CountingSummarizer {
    /// Lines summarized so far.
    pub fn lines(&self) -> usize {
        *self.lines.lock().unwrap()
    }
}

pub fn test_memory(limit: usize) -> ConversationMemory {
    ConversationMemory::new(
        Arc::new(WordCounter),
        Arc::new(CountingSummarizer::default()),
        limit,
    )
}

pub enum Scripted {
    Reply(LlmResponse),
    Fail(AppError),
}

/// Completion client that replays a script, then answers with a fixed text.
#[derive(Default)]
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_text(self, content: &str) -> Self {
        self.push(Scripted::Reply(LlmResponse::text(content, "scripted")))
    }

    pub fn then_tool(self, id: &str, name: &str, query: &str) -> Self {
        let mut response = LlmResponse::text("", "scripted");
        response.tool_calls = vec![ToolCall::new(
            id,
            name,
            serde_json::json!({ "query": query }).to_string(),
        )];
        response.finish_reason = Some("tool_calls".to_string());
        self.push(Scripted::Reply(response))
    }

    pub fn then_raw_tool(self, call: ToolCall) -> Self {
        let mut response = LlmResponse::text("", "scripted");
        response.tool_calls = vec![call];
        self.push(Scripted::Reply(response))
    }

    pub fn then_fail(self, error: AppError) -> Self {
        self.push(Scripted::Fail(error))
    }

    fn push(self, step: Scripted) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail(error)) => Err(error),
            None => Ok(LlmResponse::text("Respuesta final.", "scripted")),
        }
    }
}

pub fn fragment(source: &str, page: i64, text: &str) -> ScoredFragment {
    ScoredFragment {
        fragment: DocumentFragment {
            id: format!("{}-{}", source, page),
            text: text.to_string(),
            source: source.to_string(),
            page,
            title: String::new(),
        },
        score: 0.9,
    }
}

/// Retriever returning the same fragments for every query.
#[derive(Default)]
pub struct StubRetriever {
    fragments: Vec<ScoredFragment>,
    queries: Mutex<Vec<String>>,
}

impl StubRetriever {
    pub fn with(fragments: Vec<ScoredFragment>) -> Self {
        Self {
            fragments,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DocumentRetriever for StubRetriever {
    async fn retrieve(&self, query_text: &str) -> AppResult<Vec<ScoredFragment>> {
        self.queries.lock().unwrap().push(query_text.to_string());
        Ok(self.fragments.clone())
    }
}

/// Web search double that records every query.
pub struct RecordingWebSearch {
    reply: String,
    queries: Mutex<Vec<String>>,
}

impl RecordingWebSearch {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl WebSearch for RecordingWebSearch {
    async fn search(&self, query: &str) -> AppResult<String> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.reply.clone())
    }
}
