//! Query facade
//!
//! Single entry point for text search: validate the query, embed it,
//! and rank catalog movies by similarity. Holds no per-call state.

use cine_core::{Result, ScoredMovie, SearchConfig, SearchQuery};
use cine_vector::EmbeddingProvider;
use std::sync::Arc;
use std::time::Instant;

use crate::store::EmbeddingStore;

/// Free-text semantic search over the catalog
pub struct SearchFacade {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<EmbeddingStore>,
    config: SearchConfig,
}

impl SearchFacade {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<EmbeddingStore>,
        config: SearchConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// Search with the configured result limit
    pub async fn search_by_text(&self, input: &str) -> Result<Vec<ScoredMovie>> {
        self.search_by_text_with_limit(input, self.config.limit)
            .await
    }

    /// Search returning at most `limit` movies (never more than the configured limit)
    pub async fn search_by_text_with_limit(
        &self,
        input: &str,
        limit: usize,
    ) -> Result<Vec<ScoredMovie>> {
        let query = SearchQuery::parse(input)?;
        self.search(&query, limit.min(self.config.limit)).await
    }

    async fn search(&self, query: &SearchQuery, limit: usize) -> Result<Vec<ScoredMovie>> {
        let start = Instant::now();

        let vector = self.provider.embed(query.as_str()).await?;
        let num_candidates = self.config.num_candidates.max(limit);
        let results = self
            .store
            .similarity_search(&vector, num_candidates, limit)
            .await?;

        tracing::info!(
            query = %query,
            results = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Semantic search completed"
        );
        Ok(results)
    }
}
