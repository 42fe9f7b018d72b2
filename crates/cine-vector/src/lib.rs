//! CineSense Vector - Embeddings and similarity search
//!
//! Provides the embedding provider adapter and an abstraction over
//! approximate nearest-neighbor indexes (Qdrant, in-memory) used to
//! store and search movie embeddings.

use async_trait::async_trait;
use cine_core::Result;
use uuid::Uuid;

pub mod cache;
pub mod embedding;
pub mod memory_index;
pub mod qdrant_index;

pub use cache::{CacheStats, CachedEmbedding};
pub use embedding::{EmbeddingProvider, OpenAiEmbedding};
pub use memory_index::InMemoryIndex;
pub use qdrant_index::QdrantIndex;

/// An index hit: movie id and its similarity to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredId {
    pub id: Uuid,
    pub score: f32,
}

/// Trait for nearest-neighbor index operations
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the vector stored for a movie
    async fn upsert(&self, id: Uuid, vector: &[f32]) -> Result<()>;

    /// Remove a movie's vector; removing an absent id is not an error
    async fn remove(&self, id: Uuid) -> Result<()>;

    /// Top `limit` ids by similarity, examining about `num_candidates`
    ///
    /// Results are ordered by non-increasing score.
    async fn search(
        &self,
        query_vector: &[f32],
        num_candidates: usize,
        limit: usize,
    ) -> Result<Vec<ScoredId>>;

    /// Number of indexed vectors
    async fn len(&self) -> Result<u64>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
