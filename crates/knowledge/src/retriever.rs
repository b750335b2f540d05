//! Document retrieval: question in, ranked policy fragments out.

use crate::embeddings::EmbeddingProvider;
use crate::self_query::SelfQueryParser;
use crate::types::{ScoredFragment, StructuredQuery};
use crate::vector_index::VectorIndex;
use policypro_core::AppResult;
use std::sync::Arc;

/// Retrieval capability consumed by the orchestrator.
#[async_trait::async_trait]
pub trait DocumentRetriever: Send + Sync {
    /// Fragments relevant to `query_text`, best first. An empty result is a
    /// normal outcome.
    async fn retrieve(&self, query_text: &str) -> AppResult<Vec<ScoredFragment>>;
}

/// Self-querying retriever over a vector index.
pub struct SelfQueryRetriever {
    parser: SelfQueryParser,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    min_relevance_score: f32,
}

impl SelfQueryRetriever {
    pub fn new(
        parser: SelfQueryParser,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            parser,
            embedder,
            index,
            top_k: 4,
            min_relevance_score: 0.25,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_relevance_score(mut self, score: f32) -> Self {
        self.min_relevance_score = score;
        self
    }

    /// Run an already structured query.
    pub async fn search(&self, query: &StructuredQuery) -> AppResult<Vec<ScoredFragment>> {
        let embedding = self.embedder.embed(&query.query).await?;
        let results = self
            .index
            .search(&embedding, &query.filter, self.top_k)
            .await?;
        let total = results.len();

        let relevant: Vec<ScoredFragment> = results
            .into_iter()
            .filter(|r| r.score >= self.min_relevance_score)
            .collect();

        if relevant.is_empty() {
            tracing::info!(
                "No relevant fragments found ({} below {:.2} threshold)",
                total,
                self.min_relevance_score
            );
        } else {
            tracing::info!(
                "Retrieved {} relevant fragments (max score: {:.3})",
                relevant.len(),
                relevant[0].score
            );
        }

        Ok(relevant)
    }

    /// Fragment count of the underlying index.
    pub async fn fragment_count(&self) -> AppResult<usize> {
        self.index.count().await
    }
}

#[async_trait::async_trait]
impl DocumentRetriever for SelfQueryRetriever {
    async fn retrieve(&self, query_text: &str) -> AppResult<Vec<ScoredFragment>> {
        let structured = self.parser.parse(query_text).await?;
        self.search(&structured).await
    }
}
