//! Embedding provider trait and factory.

use policypro_core::config::LlmSettings;
use policypro_core::{AppError, AppResult};
use std::sync::Arc;

use super::providers::{mock::MockProvider, openai::OpenAiEmbeddings};

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "mock", "openai")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Upstream("No embedding returned".to_string()))
    }
}

/// Create the embedding provider described by the LLM settings.
pub fn create_provider(settings: &LlmSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.embedding_provider.as_str() {
        "mock" => Ok(Arc::new(MockProvider::new(settings.embedding_dimensions))),

        "openai" => {
            let api_key = settings.api_key.as_deref().ok_or_else(|| {
                AppError::Config("OpenAI embeddings require OPENAI_API_KEY".to_string())
            })?;
            let provider = OpenAiEmbeddings::new(
                api_key,
                settings.base_url.as_deref(),
                &settings.embedding_model,
                settings.embedding_dimensions,
            )?;
            Ok(Arc::new(provider))
        }

        other => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: mock, openai",
            other
        ))),
    }
}
