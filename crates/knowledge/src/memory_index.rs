//! In-process vector index, for offline runs and tests.

use crate::types::{DocumentFragment, Predicate, ScoredFragment};
use crate::vector_index::{cosine_similarity, rank, VectorIndex};
use policypro_core::AppResult;

/// Brute-force index over fragments held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryIndex {
    rows: Vec<(DocumentFragment, Vec<f32>)>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fragment: DocumentFragment, embedding: Vec<f32>) {
        self.rows.push((fragment, embedding));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait::async_trait]
impl VectorIndex for MemoryIndex {
    async fn search(
        &self,
        query_embedding: &[f32],
        filter: &[Predicate],
        top_k: usize,
    ) -> AppResult<Vec<ScoredFragment>> {
        let results = self
            .rows
            .iter()
            .filter(|(fragment, _)| filter.iter().all(|p| p.matches(fragment)))
            .map(|(fragment, embedding)| ScoredFragment {
                fragment: fragment.clone(),
                score: cosine_similarity(query_embedding, embedding),
            })
            .collect();
        Ok(rank(results, top_k))
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Comparator, FilterValue};

    fn fragment(id: &str, source: &str, page: i64) -> DocumentFragment {
        DocumentFragment {
            id: id.to_string(),
            text: format!("texto {}", id),
            source: source.to_string(),
            page,
            title: String::new(),
        }
    }

    #[tokio::test]
    async fn test_search_ranks_and_filters() {
        let mut index = MemoryIndex::new();
        index.insert(fragment("a", "POL1.pdf", 1), vec![1.0, 0.0]);
        index.insert(fragment("b", "POL1.pdf", 5), vec![0.7, 0.7]);
        index.insert(fragment("c", "POL2.pdf", 1), vec![0.0, 1.0]);

        let all = index.search(&[1.0, 0.0], &[], 10).await.unwrap();
        assert_eq!(
            all.iter().map(|r| r.fragment.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );

        let filter = vec![
            Predicate::eq("source", FilterValue::Text("POL1.pdf".into())),
            Predicate::new("page", Comparator::Gt, FilterValue::Integer(1)),
        ];
        let filtered = index.search(&[1.0, 0.0], &filter, 10).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].fragment.id, "b");

        assert_eq!(index.count().await.unwrap(), 3);
    }
}
