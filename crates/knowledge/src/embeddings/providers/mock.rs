//! Deterministic offline embeddings.
//!
//! Hashes accent-folded words and their character trigrams into a fixed
//! number of buckets. Not semantic, but stable and content dependent, which
//! is all the tests and offline runs need.

use crate::embeddings::provider::EmbeddingProvider;
use policypro_core::AppResult;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

const STOP_WORDS: &[&str] = &[
    "el", "la", "los", "las", "un", "una", "unos", "unas", "de", "del", "al", "y", "o", "que",
    "en", "por", "para", "con", "sin", "se", "su", "sus", "es", "son", "lo", "como", "mas",
    "the", "and", "for", "with", "of", "to", "is", "are",
];

#[derive(Debug)]
pub struct MockProvider {
    dimensions: usize,
}

impl MockProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, token: &str, seed: u64) -> usize {
        // FNV-1a
        let hash = token.bytes().fold(0xcbf2_9ce4_8422_2325_u64 ^ seed, |acc, b| {
            (acc ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
        });
        (hash % self.dimensions as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimensions];
        if self.dimensions == 0 {
            return embedding;
        }

        let folded = fold(text);
        let words = folded
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 1 && !STOP_WORDS.contains(w));

        for word in words {
            embedding[self.bucket(word, 0)] += 2.0;

            let chars: Vec<char> = format!(" {} ", word).chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                embedding[self.bucket(&trigram, 1)] += 1.0;
            }
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            embedding.iter_mut().for_each(|v| *v /= norm);
        }
        embedding
    }
}

/// Lowercase and strip diacritics.
fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "hashed-trigrams"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_index::cosine_similarity;

    #[tokio::test]
    async fn test_unit_norm_and_width() {
        let provider = MockProvider::new(128);
        let embedding = provider.embed("cobertura de hospitalización").await.unwrap();

        assert_eq!(embedding.len(), 128);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_deterministic_and_accent_insensitive() {
        let provider = MockProvider::new(128);
        let a = provider.embed("Póliza de Hogar").await.unwrap();
        let b = provider.embed("poliza de hogar").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_related_texts_score_higher() {
        let provider = MockProvider::new(256);
        let query = provider.embed("cobertura dental").await.unwrap();
        let close = provider.embed("la póliza incluye cobertura dental básica").await.unwrap();
        let far = provider.embed("exclusiones por terremoto").await.unwrap();

        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let provider = MockProvider::new(16);
        let embedding = provider.embed("").await.unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }
}
