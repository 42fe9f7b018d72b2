//! Embedding store
//!
//! Pairs the movie catalog (records and their vectors) with a
//! nearest-neighbor index. The catalog is the source of truth for which
//! movies are embedded; the index only answers similarity queries.

use cine_core::{
    ensure_dimension, CineError, EmbeddingStats, Movie, MovieCatalog, Result, ScoredMovie,
};
use cine_vector::{ScoredId, VectorIndex};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Page size used when copying catalog vectors into the index
const REBUILD_PAGE_SIZE: usize = 500;

/// Catalog records plus their similarity index
pub struct EmbeddingStore {
    catalog: Arc<dyn MovieCatalog>,
    index: Arc<dyn VectorIndex>,
    dimension: usize,
}

impl EmbeddingStore {
    /// Create a store accepting vectors of `dimension` floats
    pub fn new(
        catalog: Arc<dyn MovieCatalog>,
        index: Arc<dyn VectorIndex>,
        dimension: usize,
    ) -> Self {
        Self {
            catalog,
            index,
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Movies that still need an embedding, ascending by id
    pub async fn find_missing_embeddings(&self) -> Result<Vec<Movie>> {
        self.catalog.find_missing_embeddings().await
    }

    /// Attach (or replace) the vector of one movie
    ///
    /// The index is written first. A movie only stops counting as missing
    /// once the catalog write lands, so a failure in between leaves it
    /// eligible for the next backfill run.
    pub async fn attach_vector(&self, id: Uuid, vector: &[f32]) -> Result<()> {
        ensure_dimension(vector, self.dimension)?;

        self.index.upsert(id, vector).await?;

        match self.catalog.set_embedding(id, vector).await {
            Ok(()) => Ok(()),
            Err(CineError::NotFound(id)) => {
                tracing::error!(
                    movie_id = %id,
                    index = self.index.name(),
                    "Attached vector to a movie missing from the catalog; catalog and pipeline are out of sync"
                );
                if let Err(e) = self.index.remove(id).await {
                    tracing::warn!(movie_id = %id, "Failed to remove orphaned vector: {e}");
                }
                Err(CineError::NotFound(id))
            }
            Err(e) => Err(e),
        }
    }

    /// Movies most similar to `query_vector`, best first
    ///
    /// Only movies the catalog reports as embedded are returned. Index hits
    /// the catalog does not confirm are skipped and the index is asked for
    /// that many more, so a stale entry never shortens the result while
    /// embedded movies remain.
    pub async fn similarity_search(
        &self,
        query_vector: &[f32],
        num_candidates: usize,
        limit: usize,
    ) -> Result<Vec<ScoredMovie>> {
        ensure_dimension(query_vector, self.dimension)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut fetch = limit;
        loop {
            let hits = self
                .index
                .search(query_vector, num_candidates.max(fetch), fetch)
                .await?;
            let exhausted = hits.len() < fetch;
            let fetched = hits.len();

            let results = self.hydrate(hits, limit).await?;
            let skipped = fetched - results.len();

            if results.len() >= limit || exhausted || skipped == 0 {
                tracing::debug!(
                    index = self.index.name(),
                    hits = fetched,
                    skipped,
                    returned = results.len(),
                    "Similarity search completed"
                );
                return Ok(results);
            }
            fetch += skipped;
        }
    }

    /// Load the catalog records behind `hits`, keeping rank order
    async fn hydrate(&self, hits: Vec<ScoredId>, limit: usize) -> Result<Vec<ScoredMovie>> {
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = hits.iter().map(|hit| hit.id).collect();
        let mut movies: HashMap<Uuid, Movie> = self
            .catalog
            .get_movies(&ids)
            .await?
            .into_iter()
            .map(|movie| (movie.id, movie))
            .collect();

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let movie = movies.remove(&hit.id)?;
                movie.has_embedding().then_some(ScoredMovie {
                    movie,
                    score: hit.score,
                })
            })
            .take(limit)
            .collect())
    }

    /// Copy every stored vector from the catalog into the index
    pub async fn rebuild_index(&self) -> Result<u64> {
        let mut after = None;
        let mut indexed = 0u64;

        loop {
            let page = self
                .catalog
                .list_embeddings(after, REBUILD_PAGE_SIZE)
                .await?;
            let page_len = page.len();

            for (id, vector) in page {
                match ensure_dimension(&vector, self.dimension) {
                    Ok(()) => {
                        self.index.upsert(id, &vector).await?;
                        indexed += 1;
                    }
                    Err(e) => {
                        tracing::warn!(movie_id = %id, "Skipping unusable stored vector: {e}");
                    }
                }
                after = Some(id);
            }

            if page_len < REBUILD_PAGE_SIZE {
                break;
            }
        }

        tracing::info!(indexed, index = self.index.name(), "Rebuilt vector index");
        Ok(indexed)
    }

    /// Embedding coverage of the catalog
    pub async fn stats(&self) -> Result<EmbeddingStats> {
        self.catalog.embedding_stats().await
    }

    /// Number of vectors currently held by the index
    pub async fn index_len(&self) -> Result<u64> {
        self.index.len().await
    }

    pub fn index_name(&self) -> &str {
        self.index.name()
    }
}
