//! Per-turn answer orchestration.
//!
//! A turn picks its primary source (policy documents, or the web when the
//! user explicitly asks for it), hands the gathered context to the
//! completion service together with both tool definitions, and serves any
//! further tool calls for a bounded number of rounds.

use crate::capability::{Capability, CapabilityRequest, ToolInvocationRecord};
use crate::memory::{ConversationMemory, ConversationState, LlmSummarizer, TiktokenCounter};
use crate::policy::{PrimarySource, TurnPolicy, WEB_SEARCH_TRIGGERS};
use crate::web_search::{GoogleSearchClient, WebSearch};
use policypro_core::{AppConfig, AppError, AppResult};
use policypro_knowledge::{retriever_from_config, DocumentRetriever, ScoredFragment};
use policypro_llm::{client_from_config, ChatMessage, LlmClient, LlmRequest, ToolCall};
use policypro_prompt::{PromptLibrary, AGENT_SYSTEM};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Answer given when the documents have nothing on the question.
pub const DONT_KNOW_REPLY: &str =
    "Lo siento, no encontré información sobre eso en las pólizas disponibles, así que no lo sé.";

/// Tool output when a follow-up retrieval finds nothing.
const NO_FRAGMENTS: &str = "No se encontró información relevante en las pólizas.";

/// Result of one successful turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    pub state: ConversationState,
    pub invocations: Vec<ToolInvocationRecord>,
}

pub struct AnswerOrchestrator {
    llm: Arc<dyn LlmClient>,
    retriever: Arc<dyn DocumentRetriever>,
    web: Arc<dyn WebSearch>,
    memory: ConversationMemory,
    prompts: Arc<PromptLibrary>,
    model: String,
    temperature: f32,
    document_description: String,
    max_tool_rounds: usize,
    timeout: Duration,
}

impl AnswerOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        retriever: Arc<dyn DocumentRetriever>,
        web: Arc<dyn WebSearch>,
        memory: ConversationMemory,
        prompts: Arc<PromptLibrary>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            retriever,
            web,
            memory,
            prompts,
            model: model.into(),
            temperature: 0.0,
            document_description: policypro_knowledge::DOCUMENT_CONTENT_DESCRIPTION.to_string(),
            max_tool_rounds: 3,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_document_description(mut self, description: impl Into<String>) -> Self {
        self.document_description = description.into();
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wire up every collaborator from configuration.
    ///
    /// # Errors
    /// `Config` for missing or invalid settings, `IndexUnavailable` when the
    /// document index cannot be opened.
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;

        let model = config
            .llm
            .model
            .clone()
            .ok_or_else(|| AppError::Config("Missing required settings: FAST_LLM_MODEL".to_string()))?;

        let prompts = Arc::new(PromptLibrary::load(&config.workspace)?);
        let llm = client_from_config(config)?;
        let retriever = retriever_from_config(config, llm.clone(), prompts.clone()).await?;
        let web = GoogleSearchClient::from_settings(&config.web_search)?;

        let summarizer = LlmSummarizer::new(llm.clone(), prompts.clone(), model.clone());
        let memory = ConversationMemory::new(
            Arc::new(TiktokenCounter::new()?),
            Arc::new(summarizer),
            config.memory.max_token_limit,
        );

        tracing::info!(
            provider = llm.provider_name(),
            model = %model,
            "Answer orchestrator ready"
        );

        Ok(Self::new(llm, Arc::new(retriever), Arc::new(web), memory, prompts, model)
            .with_temperature(config.llm.temperature)
            .with_document_description(config.retrieval.document_content_description.clone())
            .with_max_tool_rounds(config.agent.max_tool_rounds)
            .with_timeout(Duration::from_secs(config.agent.request_timeout_secs)))
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Answer `user_text` given the conversation so far.
    ///
    /// `state` is never modified; the updated state is part of the outcome.
    pub async fn answer(&self, user_text: &str, state: &ConversationState) -> AppResult<TurnOutcome> {
        let span = tracing::info_span!("turn", chars = user_text.len());
        self.run_turn(user_text.trim(), state.clone())
            .instrument(span)
            .await
    }

    async fn run_turn(&self, text: &str, mut state: ConversationState) -> AppResult<TurnOutcome> {
        if text.is_empty() {
            return Ok(TurnOutcome {
                response: DONT_KNOW_REPLY.to_string(),
                state,
                invocations: Vec::new(),
            });
        }

        let mut policy = TurnPolicy::for_message(text);
        let mut invocations = Vec::new();
        let primary = PrimarySource::select(text);
        tracing::debug!(source = ?primary, "Selected primary source");

        let context = match &primary {
            PrimarySource::Documents { query } => {
                let fragments = self
                    .bounded("document retrieval", self.retriever.retrieve(query))
                    .await?;
                if fragments.is_empty() {
                    tracing::info!("No fragments found, answering without the completion service");
                    invocations.push(ToolInvocationRecord::new(
                        Capability::DocumentRetrieval,
                        query.clone(),
                        String::new(),
                    ));
                    return self
                        .finish(state, text, DONT_KNOW_REPLY.to_string(), invocations)
                        .await;
                }
                format_fragments(&fragments)
            }
            PrimarySource::Web { query } => {
                policy.authorize(Capability::WebSearch)?;
                self.bounded("web search", self.web.search(query)).await?
            }
        };
        invocations.push(ToolInvocationRecord::new(
            primary.capability(),
            primary.query(),
            context.clone(),
        ));

        let mut messages = vec![ChatMessage::system(self.system_instruction()?)];
        messages.extend(state.render());
        messages.push(ChatMessage::user(text));

        // Primary context is fed as an already answered tool call
        let context_call = ToolCall::new(
            "context_0",
            primary.capability().tool_name(),
            serde_json::json!({ "query": primary.query() }).to_string(),
        );
        messages.push(ChatMessage::assistant_tool_calls(vec![context_call]));
        messages.push(ChatMessage::tool("context_0", context));

        let tools = Capability::tool_definitions();
        let mut round = 0;
        let response = loop {
            let offer_tools = round < self.max_tool_rounds;
            let mut request = LlmRequest::new(self.model.clone(), messages.clone())
                .with_temperature(self.temperature);
            if offer_tools {
                request = request.with_tools(tools.clone());
            }

            let response = self.bounded("completion", self.llm.complete(&request)).await?;
            if !response.has_tool_calls() {
                break response.content;
            }
            if !offer_tools {
                return Err(AppError::Upstream(format!(
                    "Model kept requesting tools after {} rounds",
                    self.max_tool_rounds
                )));
            }

            round += 1;
            tracing::debug!(round, calls = response.tool_calls.len(), "Serving tool calls");

            let mut assistant = ChatMessage::assistant_tool_calls(response.tool_calls.clone());
            assistant.content = response.content.clone();
            messages.push(assistant);

            for call in &response.tool_calls {
                let request = CapabilityRequest::from_tool_call(call)?;
                policy.authorize(request.capability)?;
                let output = self.dispatch(&request).await?;
                invocations.push(ToolInvocationRecord::new(
                    request.capability,
                    request.query.clone(),
                    output.clone(),
                ));
                messages.push(ChatMessage::tool(request.call_id, output));
            }
        };

        let response = response.trim().to_string();
        if response.is_empty() {
            return Err(AppError::Upstream(
                "Completion service returned an empty answer".to_string(),
            ));
        }

        self.finish(state, text, response, invocations).await
    }

    async fn finish(
        &self,
        mut state: ConversationState,
        text: &str,
        response: String,
        invocations: Vec<ToolInvocationRecord>,
    ) -> AppResult<TurnOutcome> {
        let exchange = vec![ChatMessage::user(text), ChatMessage::assistant(response.clone())];
        self.bounded("memory update", self.memory.append_all(&mut state, exchange))
            .await?;

        tracing::info!(
            tools = invocations.len(),
            tokens = state.token_count(),
            "Turn completed"
        );
        Ok(TurnOutcome {
            response,
            state,
            invocations,
        })
    }

    async fn dispatch(&self, request: &CapabilityRequest) -> AppResult<String> {
        tracing::info!(tool = request.capability.tool_name(), query = %request.query, "Running tool");
        match request.capability {
            Capability::DocumentRetrieval => {
                let fragments = self
                    .bounded("document retrieval", self.retriever.retrieve(&request.query))
                    .await?;
                if fragments.is_empty() {
                    Ok(NO_FRAGMENTS.to_string())
                } else {
                    Ok(format_fragments(&fragments))
                }
            }
            Capability::WebSearch => self.bounded("web search", self.web.search(&request.query)).await,
        }
    }

    fn system_instruction(&self) -> AppResult<String> {
        let triggers = WEB_SEARCH_TRIGGERS
            .iter()
            .map(|phrase| format!("\"{}\"", phrase))
            .collect::<Vec<_>>()
            .join(", ");
        self.prompts.render(
            AGENT_SYSTEM,
            &[
                ("document_description", self.document_description.as_str()),
                ("retriever_tool", Capability::DocumentRetrieval.tool_name()),
                ("web_search_tool", Capability::WebSearch.tool_name()),
                ("web_search_triggers", triggers.as_str()),
            ],
        )
    }

    async fn bounded<T>(&self, what: &str, call: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                AppError::Upstream(format!(
                    "{} timed out after {:.1}s",
                    what,
                    self.timeout.as_secs_f32()
                ))
            })?
    }
}

/// Fragments as numbered context blocks with their citation.
pub fn format_fragments(fragments: &[ScoredFragment]) -> String {
    fragments
        .iter()
        .enumerate()
        .map(|(i, scored)| {
            format!(
                "[Documento {}] {}\n{}",
                i + 1,
                scored.fragment.citation(),
                scored.fragment.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use policypro_knowledge::embeddings::providers::MockProvider;
    use policypro_knowledge::{
        default_metadata_fields, FilterValue, Predicate, SelfQueryParser, SelfQueryRetriever,
        VectorIndex,
    };
    use policypro_llm::Role;
    use std::sync::Mutex;

    fn orchestrator(
        llm: Arc<ScriptedLlm>,
        retriever: Arc<dyn DocumentRetriever>,
        web: Arc<RecordingWebSearch>,
    ) -> AnswerOrchestrator {
        AnswerOrchestrator::new(
            llm,
            retriever,
            web,
            test_memory(2500),
            Arc::new(PromptLibrary::builtin()),
            "gpt-3.5-turbo",
        )
    }

    fn policy_fragments() -> Vec<ScoredFragment> {
        vec![fragment(
            "POL123.pdf",
            2,
            "La póliza cubre hospitalización, cirugía y medicamentos.",
        )]
    }

    #[tokio::test]
    async fn test_document_answer_without_trigger() {
        let llm = Arc::new(ScriptedLlm::new().then_text("Cubre hospitalización y cirugía."));
        let retriever = Arc::new(StubRetriever::with(policy_fragments()));
        let web = Arc::new(RecordingWebSearch::new("web"));
        let orchestrator = orchestrator(llm.clone(), retriever.clone(), web.clone());

        let outcome = orchestrator
            .answer("¿Qué cubre la póliza POL123?", &ConversationState::new())
            .await
            .unwrap();

        assert_eq!(outcome.response, "Cubre hospitalización y cirugía.");
        assert!(web.queries().is_empty());
        assert_eq!(retriever.queries(), vec!["¿Qué cubre la póliza POL123?"]);
        assert_eq!(outcome.invocations.len(), 1);
        assert_eq!(outcome.invocations[0].tool_name, "retriever");
        assert!(outcome.invocations[0].output.contains("POL123.pdf, página 2"));

        let request = &llm.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.contains("busca en google"));
        assert_eq!(request.tools.len(), 2);
        let context = request.messages.last().unwrap();
        assert_eq!(context.role, Role::Tool);
        assert!(context.content.contains("[Documento 1]"));

        let rendered = outcome.state.render();
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0].content, "¿Qué cubre la póliza POL123?");
        assert_eq!(rendered[1].content, "Cubre hospitalización y cirugía.");
    }

    #[tokio::test]
    async fn test_system_instruction_lists_every_trigger() {
        let llm = Arc::new(ScriptedLlm::new().then_text("Listo."));
        let retriever = Arc::new(StubRetriever::with(policy_fragments()));
        let web = Arc::new(RecordingWebSearch::new("web"));
        let orchestrator = orchestrator(llm.clone(), retriever, web);

        orchestrator
            .answer("¿Qué cubre la póliza POL123?", &ConversationState::new())
            .await
            .unwrap();

        let system = &llm.requests()[0].messages[0].content;
        for phrase in WEB_SEARCH_TRIGGERS {
            assert!(system.contains(&format!("\"{}\"", phrase)), "missing {}", phrase);
        }
        assert!(!system.contains("{{"));
    }

    #[tokio::test]
    async fn test_empty_retrieval_answers_dont_know() {
        let llm = Arc::new(ScriptedLlm::new());
        let retriever = Arc::new(StubRetriever::default());
        let web = Arc::new(RecordingWebSearch::new("web"));
        let orchestrator = orchestrator(llm.clone(), retriever, web.clone());

        let outcome = orchestrator
            .answer("¿Cubre viajes a Marte?", &ConversationState::new())
            .await
            .unwrap();

        assert_eq!(outcome.response, DONT_KNOW_REPLY);
        assert!(llm.requests().is_empty());
        assert!(web.queries().is_empty());
        assert_eq!(outcome.state.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_trigger_runs_exactly_one_web_search() {
        let llm = Arc::new(ScriptedLlm::new().then_text("Hoy está soleado."));
        let retriever = Arc::new(StubRetriever::with(policy_fragments()));
        let web = Arc::new(RecordingWebSearch::new("Soleado, 24 grados."));
        let orchestrator = orchestrator(llm.clone(), retriever.clone(), web.clone());

        let outcome = orchestrator
            .answer("busca en google el clima de hoy", &ConversationState::new())
            .await
            .unwrap();

        assert_eq!(outcome.response, "Hoy está soleado.");
        assert_eq!(web.queries(), vec!["el clima de hoy"]);
        assert!(retriever.queries().is_empty());
        assert_eq!(outcome.invocations[0].tool_name, "google_search");
        assert_eq!(outcome.invocations[0].output, "Soleado, 24 grados.");
    }

    #[tokio::test]
    async fn test_unrequested_web_search_is_refused() {
        let llm = Arc::new(ScriptedLlm::new().then_tool("c1", "google_search", "noticias"));
        let retriever = Arc::new(StubRetriever::with(policy_fragments()));
        let web = Arc::new(RecordingWebSearch::new("web"));
        let orchestrator = orchestrator(llm, retriever, web.clone());

        let result = orchestrator
            .answer("¿Qué cubre la póliza?", &ConversationState::new())
            .await;

        assert!(matches!(result, Err(AppError::PolicyViolation(_))));
        assert!(web.queries().is_empty());
    }

    #[tokio::test]
    async fn test_second_web_search_is_refused() {
        let llm = Arc::new(ScriptedLlm::new().then_tool("c1", "google_search", "más clima"));
        let retriever = Arc::new(StubRetriever::default());
        let web = Arc::new(RecordingWebSearch::new("Soleado."));
        let orchestrator = orchestrator(llm, retriever, web.clone());

        let result = orchestrator
            .answer("busca en google el clima de hoy", &ConversationState::new())
            .await;

        assert!(matches!(result, Err(AppError::PolicyViolation(_))));
        assert_eq!(web.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_follow_up_retrieval_round() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .then_tool("c1", "retriever", "exclusiones POL123")
                .then_text("No cubre deportes extremos."),
        );
        let retriever = Arc::new(StubRetriever::with(policy_fragments()));
        let web = Arc::new(RecordingWebSearch::new("web"));
        let orchestrator = orchestrator(llm.clone(), retriever.clone(), web);

        let outcome = orchestrator
            .answer("¿Qué excluye la póliza POL123?", &ConversationState::new())
            .await
            .unwrap();

        assert_eq!(outcome.response, "No cubre deportes extremos.");
        assert_eq!(outcome.invocations.len(), 2);
        assert_eq!(outcome.invocations[1].input, "exclusiones POL123");
        assert_eq!(retriever.queries().len(), 2);

        let second = &llm.requests()[1];
        let tool_reply = second.messages.last().unwrap();
        assert_eq!(tool_reply.tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_tool_rounds_are_bounded() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .then_tool("c1", "retriever", "a")
                .then_tool("c2", "retriever", "b")
                .then_tool("c3", "retriever", "c"),
        );
        let retriever = Arc::new(StubRetriever::with(policy_fragments()));
        let web = Arc::new(RecordingWebSearch::new("web"));
        let orchestrator = orchestrator(llm.clone(), retriever, web).with_max_tool_rounds(2);

        let result = orchestrator
            .answer("¿Qué cubre?", &ConversationState::new())
            .await;

        assert!(matches!(result, Err(AppError::Upstream(_))));
        let requests = llm.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[2].tools.is_empty());
    }

    #[tokio::test]
    async fn test_bad_tool_requests_are_upstream_errors() {
        for call in [
            ToolCall::new("c1", "calculator", r#"{"query": "2+2"}"#),
            ToolCall::new("c2", "retriever", "not json"),
        ] {
            let llm = Arc::new(ScriptedLlm::new().then_raw_tool(call));
            let retriever = Arc::new(StubRetriever::with(policy_fragments()));
            let web = Arc::new(RecordingWebSearch::new("web"));
            let orchestrator = orchestrator(llm, retriever, web);

            let result = orchestrator
                .answer("¿Qué cubre?", &ConversationState::new())
                .await;
            assert!(matches!(result, Err(AppError::Upstream(_))));
        }
    }

    #[tokio::test]
    async fn test_failed_completion_skips_memory_update() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .then_fail(AppError::Upstream("connection reset".to_string()))
                .then_text("El deducible es de 500."),
        );
        let summarizer = Arc::new(CountingSummarizer::default());
        let memory = ConversationMemory::new(Arc::new(WordCounter), summarizer.clone(), 12);
        let orchestrator = AnswerOrchestrator::new(
            llm,
            Arc::new(StubRetriever::with(policy_fragments())),
            Arc::new(RecordingWebSearch::new("web")),
            memory,
            Arc::new(PromptLibrary::builtin()),
            "m",
        );

        let result = orchestrator
            .answer("¿Y el deducible?", &ConversationState::new())
            .await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
        assert_eq!(summarizer.lines(), 0);

        let outcome = orchestrator
            .answer("¿Y el deducible?", &ConversationState::new())
            .await
            .unwrap();
        assert_eq!(outcome.response, "El deducible es de 500.");
        assert_eq!(summarizer.lines(), 2);
        assert!(outcome.state.messages().is_empty());
        assert_eq!(outcome.state.summary(), Some("Resumen de 2 mensajes anteriores"));
    }

    struct SlowLlm;

    #[async_trait::async_trait]
    impl LlmClient for SlowLlm {
        fn provider_name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _request: &LlmRequest) -> AppResult<policypro_llm::LlmResponse> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(policypro_llm::LlmResponse::text("tarde", "slow"))
        }
    }

    #[tokio::test]
    async fn test_completion_timeout_is_upstream_error() {
        let orchestrator = AnswerOrchestrator::new(
            Arc::new(SlowLlm),
            Arc::new(StubRetriever::with(policy_fragments())),
            Arc::new(RecordingWebSearch::new("web")),
            test_memory(2500),
            Arc::new(PromptLibrary::builtin()),
            "m",
        )
        .with_timeout(Duration::from_millis(50));

        let result = orchestrator
            .answer("¿Qué cubre?", &ConversationState::new())
            .await;
        match result {
            Err(AppError::Upstream(message)) => assert!(message.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other.map(|o| o.response)),
        }
    }

    /// Index that records the filters it receives.
    struct RecordingIndex {
        filters: Mutex<Vec<Vec<Predicate>>>,
    }

    #[async_trait::async_trait]
    impl VectorIndex for RecordingIndex {
        async fn search(
            &self,
            _query_embedding: &[f32],
            filter: &[Predicate],
            _top_k: usize,
        ) -> AppResult<Vec<ScoredFragment>> {
            self.filters.lock().unwrap().push(filter.to_vec());
            Ok(policy_fragments())
        }

        async fn count(&self) -> AppResult<usize> {
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_policy_code_becomes_source_filter() {
        let parser_llm = Arc::new(
            ScriptedLlm::new().then_text(r#"{"query": "cobertura", "filter": []}"#),
        );
        let index = Arc::new(RecordingIndex {
            filters: Mutex::new(Vec::new()),
        });
        let parser = SelfQueryParser::new(
            parser_llm,
            Arc::new(PromptLibrary::builtin()),
            "m",
            policypro_knowledge::DOCUMENT_CONTENT_DESCRIPTION,
            default_metadata_fields(),
        );
        let retriever = SelfQueryRetriever::new(parser, Arc::new(MockProvider::new(64)), index.clone());

        let llm = Arc::new(ScriptedLlm::new().then_text("Cubre hospitalización, cirugía y medicamentos."));
        let orchestrator = orchestrator(llm, Arc::new(retriever), Arc::new(RecordingWebSearch::new("web")));

        let outcome = orchestrator
            .answer("¿Qué cubre la póliza POL123?", &ConversationState::new())
            .await
            .unwrap();

        let filters = index.filters.lock().unwrap().clone();
        assert_eq!(
            filters,
            vec![vec![Predicate::eq("source", FilterValue::Text("POL123.pdf".to_string()))]]
        );
        assert!(outcome.response.contains("hospitalización"));
    }

    #[test]
    fn test_format_fragments() {
        let text = format_fragments(&[
            fragment("POL1.pdf", 1, "Texto uno "),
            fragment("POL2.pdf", 3, "Texto dos"),
        ]);
        assert_eq!(
            text,
            "[Documento 1] POL1.pdf, página 1\nTexto uno\n\n[Documento 2] POL2.pdf, página 3\nTexto dos"
        );
    }
}
