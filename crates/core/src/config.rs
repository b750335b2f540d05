//! Configuration management for Policy Pro.
//!
//! Values are layered, later sources winning:
//! 1. Built-in defaults
//! 2. Config file (`.policypro/config.yaml`, or `POLICYPRO_CONFIG`)
//! 3. Environment variables
//! 4. Command-line flags (see [`AppConfig::with_overrides`])
//!
//! Credentials are only ever read from the environment, never from the YAML
//! file. Whether everything the assistant needs is present is checked once,
//! at startup, by [`AppConfig::validate`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".policypro";

/// Completion providers this build knows how to construct.
pub const KNOWN_PROVIDERS: [&str; 1] = ["openai"];

/// Embedding providers this build knows how to construct.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["openai", "mock"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .policypro/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub web_search: WebSearchSettings,
    pub memory: MemorySettings,
    pub agent: AgentSettings,
}

/// Completion and embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LlmSettings {
    /// Completion provider (currently only "openai")
    pub provider: String,

    /// API credential, from `OPENAI_API_KEY`
    #[serde(skip)]
    pub api_key: Option<String>,

    /// Custom endpoint for OpenAI-compatible servers
    pub base_url: Option<String>,

    /// Chat model identifier, from `FAST_LLM_MODEL`
    pub model: Option<String>,

    /// Sampling temperature; 0 keeps answers deterministic
    pub temperature: f32,

    /// Embedding provider ("openai" or "mock")
    pub embedding_provider: String,

    /// Embedding model identifier
    pub embedding_model: String,

    /// Dimension of the vectors stored in the index
    pub embedding_dimensions: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: None,
            base_url: None,
            model: None,
            temperature: 0.0,
            embedding_provider: "openai".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            embedding_dimensions: 1536,
        }
    }
}

/// Document index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrievalSettings {
    /// Directory of the persisted LanceDB index, from `POLICYPRO_INDEX_PATH`
    pub index_path: Option<PathBuf>,

    /// Table holding the document fragments
    pub table_name: String,

    /// Number of fragments returned per lookup
    pub top_k: usize,

    /// Fragments scoring below this cosine similarity are dropped
    pub min_relevance_score: f32,

    /// Short description of the collection, given to the query parser
    pub document_content_description: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            index_path: None,
            table_name: "fragments".to_string(),
            top_k: 4,
            min_relevance_score: 0.25,
            document_content_description: "Colección de pólizas de seguros".to_string(),
        }
    }
}

/// Web search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebSearchSettings {
    /// From `GOOGLE_API_KEY`
    #[serde(skip)]
    pub api_key: Option<String>,

    /// Programmable search engine id, from `CUSTOM_SEARCH_ENGINE_ID`
    pub engine_id: Option<String>,

    pub endpoint: String,

    /// Results requested per search
    pub num_results: u32,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            engine_id: None,
            endpoint: "https://www.googleapis.com/customsearch/v1".to_string(),
            num_results: 5,
        }
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemorySettings {
    /// Token ceiling for summary + unsummarized messages
    pub max_token_limit: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            max_token_limit: 2500,
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentSettings {
    /// Upper bound on completion rounds that may request tools in one turn
    pub max_tool_rounds: usize,

    /// Timeout applied to every external call, in seconds
    pub request_timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: 3,
            request_timeout_secs: 60,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSettings>,
    retrieval: Option<RetrievalSettings>,
    #[serde(rename = "webSearch")]
    web_search: Option<WebSearchSettings>,
    memory: Option<MemorySettings>,
    agent: Option<AgentSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: LlmSettings::default(),
            retrieval: RetrievalSettings::default(),
            web_search: WebSearchSettings::default(),
            memory: MemorySettings::default(),
            agent: AgentSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment, the config file and
    /// defaults.
    ///
    /// Environment variables:
    /// - `POLICYPRO_WORKSPACE`, `POLICYPRO_CONFIG`
    /// - `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `FAST_LLM_MODEL`, `TEMPERATURE`
    /// - `EMBEDDING_MODEL`
    /// - `POLICYPRO_INDEX_PATH`
    /// - `GOOGLE_API_KEY`, `CUSTOM_SEARCH_ENGINE_ID`
    /// - `RUST_LOG`, `NO_COLOR`
    ///
    /// # Example
    /// ```no_run
    /// use policypro_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load configuration reading variables through `env` instead of the
    /// process environment.
    pub fn load_with<F>(env: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::load_with_paths(env, None, None)
    }

    /// Load configuration with a workspace and config file chosen on the
    /// command line. Both take precedence over `POLICYPRO_WORKSPACE` and
    /// `POLICYPRO_CONFIG` and decide which YAML file is merged.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        Self::load_with_paths(|name| std::env::var(name).ok(), workspace, config_file)
    }

    /// [`AppConfig::load_with`] with explicit workspace and config file.
    pub fn load_with_paths<F>(
        env: F,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
    ) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let var = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let mut config = Self::default();

        if let Some(workspace) = workspace.or_else(|| var("POLICYPRO_WORKSPACE").map(PathBuf::from)) {
            config.workspace = workspace;
        }

        if let Some(config_file) = config_file.or_else(|| var("POLICYPRO_CONFIG").map(PathBuf::from)) {
            config.config_file = Some(config_file);
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.state_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        // Environment variables override YAML config
        config.llm.api_key = var("OPENAI_API_KEY");

        if let Some(base_url) = var("OPENAI_BASE_URL") {
            config.llm.base_url = Some(base_url);
        }

        if let Some(model) = var("FAST_LLM_MODEL") {
            config.llm.model = Some(model);
        }

        if let Some(temperature) = var("TEMPERATURE") {
            config.llm.temperature = temperature.trim().parse().map_err(|_| {
                AppError::Config(format!("TEMPERATURE is not a number: {}", temperature))
            })?;
        }

        if let Some(embedding_model) = var("EMBEDDING_MODEL") {
            config.llm.embedding_model = embedding_model;
        }

        if let Some(index_path) = var("POLICYPRO_INDEX_PATH") {
            config.retrieval.index_path = Some(PathBuf::from(index_path));
        }

        config.web_search.api_key = var("GOOGLE_API_KEY");

        if let Some(engine_id) = var("CUSTOM_SEARCH_ENGINE_ID") {
            config.web_search.engine_id = Some(engine_id);
        }

        if let Some(level) = var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if env("NO_COLOR").is_some() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = file.llm {
            result.llm = llm;
        }
        if let Some(retrieval) = file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(web_search) = file.web_search {
            result.web_search = web_search;
        }
        if let Some(memory) = file.memory {
            result.memory = memory;
        }
        if let Some(agent) = file.agent {
            result.agent = agent;
        }

        tracing::debug!("Merged config file {:?}", path);
        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        model: Option<String>,
        index_path: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(model) = model {
            self.llm.model = Some(model);
        }

        if let Some(index_path) = index_path {
            self.retrieval.index_path = Some(index_path);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .policypro directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .policypro directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }

    /// Index location, resolved against the workspace when relative.
    pub fn index_path(&self) -> Option<PathBuf> {
        self.retrieval.index_path.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                self.workspace.join(path)
            }
        })
    }

    /// Check that every value the assistant needs is present and sane.
    ///
    /// All missing values are reported together so a misconfigured
    /// deployment can be fixed in one pass.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.llm.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if !KNOWN_EMBEDDING_PROVIDERS.contains(&self.llm.embedding_provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.llm.embedding_provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        let mut missing = Vec::new();
        if self.llm.api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.llm.model.is_none() {
            missing.push("FAST_LLM_MODEL");
        }
        if self.retrieval.index_path.is_none() {
            missing.push("POLICYPRO_INDEX_PATH");
        }
        if self.web_search.api_key.is_none() {
            missing.push("GOOGLE_API_KEY");
        }
        if self.web_search.engine_id.is_none() {
            missing.push("CUSTOM_SEARCH_ENGINE_ID");
        }

        if !missing.is_empty() {
            return Err(AppError::Config(format!(
                "Missing required settings: {}",
                missing.join(", ")
            )));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AppError::Config(format!(
                "Temperature must be between 0 and 2, got {}",
                self.llm.temperature
            )));
        }

        if self.retrieval.top_k == 0 {
            return Err(AppError::Config("retrieval.topK must be at least 1".to_string()));
        }

        if self.memory.max_token_limit == 0 {
            return Err(AppError::Config(
                "memory.maxTokenLimit must be greater than 0".to_string(),
            ));
        }

        if self.llm.embedding_dimensions == 0 {
            return Err(AppError::Config(
                "llm.embeddingDimensions must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
