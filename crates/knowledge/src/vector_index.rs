//! Vector index abstraction for policy fragments.

use crate::types::{Predicate, ScoredFragment};
use policypro_core::AppResult;

/// Read-only similarity search over embedded fragments.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top-k fragments matching every predicate in `filter`, ordered by
    /// descending similarity.
    async fn search(
        &self,
        query_embedding: &[f32],
        filter: &[Predicate],
        top_k: usize,
    ) -> AppResult<Vec<ScoredFragment>>;

    /// Number of fragments in the index.
    async fn count(&self) -> AppResult<usize>;
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Sort by descending score and keep the first `top_k`.
pub(crate) fn rank(mut results: Vec<ScoredFragment>, top_k: usize) -> Vec<ScoredFragment> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
    results
}
