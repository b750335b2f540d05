//! Document index client for Policy Pro.
//!
//! Read-only retrieval over an offline-built LanceDB index of policy
//! fragments: self-query parsing, query embedding, filtered similarity
//! search.

pub mod embeddings;
pub mod lancedb_index;
pub mod memory_index;
pub mod retriever;
pub mod self_query;
pub mod types;
pub mod vector_index;

pub use embeddings::{create_provider, EmbeddingProvider};
pub use lancedb_index::LanceDbIndex;
pub use memory_index::MemoryIndex;
pub use retriever::{DocumentRetriever, SelfQueryRetriever};
pub use self_query::SelfQueryParser;
pub use types::{
    default_metadata_fields, AttributeInfo, AttributeType, Comparator, DocumentFragment,
    FilterValue, Predicate, ScoredFragment, StructuredQuery, DOCUMENT_CONTENT_DESCRIPTION,
};
pub use vector_index::VectorIndex;

use policypro_core::{AppConfig, AppError, AppResult};
use policypro_llm::LlmClient;
use policypro_prompt::PromptLibrary;
use std::sync::Arc;

/// Open the configured index.
pub async fn open_index(config: &AppConfig) -> AppResult<LanceDbIndex> {
    let path = config
        .index_path()
        .ok_or_else(|| AppError::Config("Missing required settings: POLICYPRO_INDEX_PATH".to_string()))?;
    LanceDbIndex::open(
        &path,
        &config.retrieval.table_name,
        config.llm.embedding_dimensions,
    )
    .await
}

/// Build the retriever described by `config`.
///
/// # Errors
/// `Config` for missing settings, `IndexUnavailable` when the index cannot be
/// opened.
pub async fn retriever_from_config(
    config: &AppConfig,
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
) -> AppResult<SelfQueryRetriever> {
    let model = config
        .llm
        .model
        .clone()
        .ok_or_else(|| AppError::Config("Missing required settings: FAST_LLM_MODEL".to_string()))?;

    let embedder = create_provider(&config.llm)?;
    let index = open_index(config).await?;

    let parser = SelfQueryParser::new(
        llm,
        prompts,
        model,
        config.retrieval.document_content_description.clone(),
        default_metadata_fields(),
    );

    Ok(SelfQueryRetriever::new(parser, embedder, Arc::new(index))
        .with_top_k(config.retrieval.top_k)
        .with_min_relevance_score(config.retrieval.min_relevance_score))
}
