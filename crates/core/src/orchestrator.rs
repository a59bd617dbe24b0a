use crate::highlight::count_occurrences;
use crate::models::PdfChunk;
use crate::traits::{KeywordIndex, VectorIndex};
use crate::{SearchCandidate, SearchError, SearchMode, SearchQuery, SearchResult};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

const RRF_K: f64 = 60.0;
const LEXICAL_WEIGHT: f64 = 0.65;
const EMBEDDING_WEIGHT: f64 = 0.35;
const HYBRID_CANDIDATES: usize = 50;

/// Runs a query against the index with the scoring strategy it asks for.
pub struct SearchCoordinator<I> {
    index: Arc<I>,
}

impl<I> SearchCoordinator<I>
where
    I: KeywordIndex + VectorIndex,
{
    pub fn new(index: Arc<I>) -> Self {
        Self { index }
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult, SearchError> {
        if query.text.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let mut query = query.clone();
        query.top_k = query.top_k.max(1);

        let hits = match query.mode {
            SearchMode::Lexical => self.index.search_keyword(&query).await?,
            SearchMode::Embedding => {
                let vector = self.index.embed_query(&query.text);
                self.index.search_vector(&vector, &query).await?
            }
            SearchMode::Hybrid => self.hybrid(&query).await?,
        };

        Ok(SearchResult {
            query: query.text.clone(),
            mode: query.mode,
            hits,
        })
    }

    /// Reciprocal-rank fusion of both rankings, kept to chunks that contain
    /// at least one query term.
    async fn hybrid(&self, query: &SearchQuery) -> Result<Vec<SearchCandidate>, SearchError> {
        let mut widened = query.clone();
        widened.top_k = query.top_k.saturating_mul(4).max(HYBRID_CANDIDATES);
        let vector = self.index.embed_query(&query.text);

        let (keyword_hits, vector_hits) = tokio::try_join!(
            self.index.search_keyword(&widened),
            self.index.search_vector(&vector, &widened)
        )?;

        let mut fused = FusedHits::default();
        fused.apply_rrf(&keyword_hits, LEXICAL_WEIGHT);
        fused.apply_rrf(&vector_hits, EMBEDDING_WEIGHT);

        let terms = query.terms();
        let mut hits = fused
            .hits
            .into_iter()
            .filter(|hit| count_occurrences(&hit.chunk.text_normalized, &terms) > 0)
            .collect::<Vec<_>>();
        hits.sort_by(|left, right| {
            right
                .total_score
                .partial_cmp(&left.total_score)
                .unwrap_or(Ordering::Equal)
        });

        Ok(hits
            .into_iter()
            .take(query.top_k)
            .map(|hit| SearchCandidate {
                chunk: hit.chunk,
                score: hit.total_score,
                mode: SearchMode::Hybrid,
            })
            .collect())
    }
}

#[derive(Debug)]
struct ScoredHit {
    chunk: PdfChunk,
    total_score: f64,
}

/// Fused hits in first-seen order, so ties stay deterministic.
#[derive(Debug, Default)]
struct FusedHits {
    hits: Vec<ScoredHit>,
    positions: HashMap<String, usize>,
}

impl FusedHits {
    fn apply_rrf(&mut self, ranked: &[SearchCandidate], weight: f64) {
        for (position, hit) in ranked.iter().enumerate() {
            let rank_component = weight / (RRF_K + position as f64 + 1.0);
            let slot = match self.positions.get(&hit.chunk.chunk_id) {
                Some(slot) => *slot,
                None => {
                    self.hits.push(ScoredHit {
                        chunk: hit.chunk.clone(),
                        total_score: 0.0,
                    });
                    self.positions
                        .insert(hit.chunk.chunk_id.clone(), self.hits.len() - 1);
                    self.hits.len() - 1
                }
            };
            self.hits[slot].total_score += rank_component;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::Document;
    use crate::stores::MemoryIndex;
    use crate::traits::{ChunkStore, KeywordIndex, VectorIndex};
    use async_trait::async_trait;
    use chrono::Utc;

    fn candidate(id: &str, text: &str, mode: SearchMode) -> SearchCandidate {
        SearchCandidate {
            chunk: PdfChunk {
                chunk_id: id.to_string(),
                document_id: "doc-1".to_string(),
                document_name: "doc.pdf".to_string(),
                page_number: 1,
                chunk_index: 0,
                section_path: None,
                text_raw: text.to_string(),
                text_normalized: text.to_string(),
            },
            score: 1.0,
            mode,
        }
    }

    #[derive(Default)]
    struct FakeIndex {
        keyword: Vec<SearchCandidate>,
        vector: Vec<SearchCandidate>,
    }

    #[async_trait]
    impl KeywordIndex for FakeIndex {
        async fn search_keyword(&self, query: &SearchQuery) -> Result<Vec<SearchCandidate>, SearchError> {
            Ok(self.keyword.iter().take(query.top_k).cloned().collect())
        }
    }

    #[async_trait]
    impl VectorIndex for FakeIndex {
        fn embed_query(&self, _text: &str) -> Vec<f32> {
            Vec::new()
        }

        async fn search_vector(
            &self,
            _query_vector: &[f32],
            query: &SearchQuery,
        ) -> Result<Vec<SearchCandidate>, SearchError> {
            Ok(self.vector.iter().take(query.top_k).cloned().collect())
        }
    }

    fn fake() -> FakeIndex {
        FakeIndex {
            keyword: vec![
                candidate("chunk-1", "hydraulic pump failure", SearchMode::Lexical),
                candidate("chunk-3", "pump housing", SearchMode::Lexical),
            ],
            vector: vec![
                candidate("chunk-2", "hydrolic pmp", SearchMode::Embedding),
                candidate("chunk-3", "pump housing", SearchMode::Embedding),
                candidate("chunk-1", "hydraulic pump failure", SearchMode::Embedding),
            ],
        }
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let coordinator = SearchCoordinator::new(Arc::new(fake()));
        let result = coordinator.search(&SearchQuery::new("   ")).await;
        assert!(matches!(result, Err(SearchError::EmptyQuery)));
    }

    #[tokio::test]
    async fn lexical_mode_returns_keyword_ranking() {
        let coordinator = SearchCoordinator::new(Arc::new(fake()));
        let result = coordinator
            .search(&SearchQuery::new("hydraulic pump"))
            .await
            .expect("search should succeed");

        assert_eq!(result.mode, SearchMode::Lexical);
        let ids = result.hits.iter().map(|h| h.chunk.chunk_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["chunk-1", "chunk-3"]);
    }

    #[tokio::test]
    async fn embedding_mode_returns_vector_ranking() {
        let coordinator = SearchCoordinator::new(Arc::new(fake()));
        let mut query = SearchQuery::new("hydraulic pump");
        query.mode = SearchMode::Embedding;
        query.top_k = 0;

        let result = coordinator.search(&query).await.expect("search should succeed");

        assert_eq!(result.hits.len(), 1, "top_k is clamped to one");
        assert_eq!(result.hits[0].chunk.chunk_id, "chunk-2");
    }

    #[tokio::test]
    async fn queries_use_the_index_embedder() {
        let index = Arc::new(MemoryIndex::with_embedder(CharacterNgramEmbedder {
            dimensions: 32,
            ngram: 3,
        }));
        let document = Document {
            document_id: "doc-1".to_string(),
            document_name: "doc.pdf".to_string(),
            checksum: "abc".to_string(),
            byte_len: 3,
            pages_indexed: 1,
            ingested_at: Utc::now(),
        };
        let chunk = candidate("chunk-1", "asthma attack in children", SearchMode::Lexical).chunk;
        index
            .insert(document, Vec::new(), vec![chunk])
            .await
            .expect("insert should succeed");

        let coordinator = SearchCoordinator::new(index);
        for mode in [SearchMode::Embedding, SearchMode::Hybrid] {
            let mut query = SearchQuery::new("asthma attack");
            query.mode = mode;
            let result = coordinator.search(&query).await.expect("search should succeed");
            assert_eq!(result.hits.len(), 1, "mode {mode}");
            assert_eq!(result.hits[0].chunk.chunk_id, "chunk-1");
        }
    }

    #[tokio::test]
    async fn hybrid_fuses_and_keeps_only_term_matches() {
        let coordinator = SearchCoordinator::new(Arc::new(fake()));
        let mut query = SearchQuery::new("hydraulic pump");
        query.mode = SearchMode::Hybrid;

        let result = coordinator.search(&query).await.expect("search should succeed");

        let ids = result.hits.iter().map(|h| h.chunk.chunk_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["chunk-1", "chunk-3"]);
        assert!(result.hits[0].score > result.hits[1].score);
        assert!(result.hits.iter().all(|hit| hit.mode == SearchMode::Hybrid));
    }
}
