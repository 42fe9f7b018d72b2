//! In-memory vector index
//!
//! Exact cosine scan over every stored vector. It is the degenerate
//! nearest-neighbor index with perfect recall, so `num_candidates` has
//! no effect. Suited to tests and catalogs small enough to rebuild from
//! the database at startup.

use async_trait::async_trait;
use cine_core::{ensure_dimension, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::{ScoredId, VectorIndex};

/// Process-local exact index
pub struct InMemoryIndex {
    dimension: usize,
    vectors: RwLock<HashMap<Uuid, Vec<f32>>>,
}

impl InMemoryIndex {
    /// Create an empty index for vectors of `dimension` floats
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: RwLock::new(HashMap::new()),
        }
    }
}

/// Cosine similarity in [-1, 1]; zero vectors score 0
///
/// Accumulates in f64 so finite f32 inputs near `f32::MAX` cannot
/// overflow the norms.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, id: Uuid, vector: &[f32]) -> Result<()> {
        ensure_dimension(vector, self.dimension)?;
        self.vectors
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, vector.to_vec());
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        self.vectors
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        _num_candidates: usize,
        limit: usize,
    ) -> Result<Vec<ScoredId>> {
        ensure_dimension(query_vector, self.dimension)?;

        let vectors = self
            .vectors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut hits: Vec<ScoredId> = vectors
            .iter()
            .map(|(id, vector)| ScoredId {
                id: *id,
                score: cosine_similarity(query_vector, vector),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn len(&self) -> Result<u64> {
        Ok(self
            .vectors
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len() as u64)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cine_core::CineError;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let index = InMemoryIndex::new(2);
        let (near, mid, far) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        index.upsert(far, &[-1.0, 0.0]).await.unwrap();
        index.upsert(near, &[1.0, 0.1]).await.unwrap();
        index.upsert(mid, &[0.5, 0.5]).await.unwrap();

        let hits = index.search(&[1.0, 0.0], 100, 10).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![near, mid, far]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_search_respects_limit_and_empty_index() {
        let index = InMemoryIndex::new(2);
        assert!(index.search(&[1.0, 0.0], 100, 5).await.unwrap().is_empty());

        for i in 0..4 {
            index.upsert(Uuid::new_v4(), &[1.0, i as f32]).await.unwrap();
        }
        assert_eq!(index.search(&[1.0, 0.0], 100, 3).await.unwrap().len(), 3);
        assert_eq!(index.search(&[1.0, 0.0], 100, 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_remove() {
        let index = InMemoryIndex::new(2);
        let id = Uuid::new_v4();
        index.upsert(id, &[1.0, 0.0]).await.unwrap();
        index.upsert(id, &[0.0, 1.0]).await.unwrap();
        assert_eq!(index.len().await.unwrap(), 1);

        let hits = index.search(&[0.0, 1.0], 10, 1).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);

        index.remove(id).await.unwrap();
        index.remove(id).await.unwrap();
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let index = InMemoryIndex::new(3);
        let result = tokio_test::block_on(index.upsert(Uuid::new_v4(), &[1.0]));
        assert!(matches!(
            result,
            Err(CineError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_huge_components_keep_ranking_ordered() {
        let index = InMemoryIndex::new(2);
        for i in 0..40 {
            let vector = if i % 5 == 0 {
                [f32::MAX, f32::MAX]
            } else {
                [1.0, i as f32 / 10.0]
            };
            index.upsert(Uuid::new_v4(), &vector).await.unwrap();
        }

        let hits = index.search(&[1.0, 0.1], 100, 40).await.unwrap();

        assert_eq!(hits.len(), 40);
        assert!(hits.iter().all(|h| h.score.is_finite()));
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        let diagonal = cosine_similarity(&[1.0, 0.1], &[f32::MAX, f32::MAX]);
        assert!((diagonal - 0.7740).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_non_finite_vectors_rejected() {
        let index = InMemoryIndex::new(2);
        let result = index.upsert(Uuid::new_v4(), &[f32::NAN, 1.0]).await;
        assert!(matches!(result, Err(CineError::NonFiniteVector { position: 0 })));

        let result = index.search(&[1.0, f32::INFINITY], 10, 5).await;
        assert!(matches!(result, Err(CineError::NonFiniteVector { position: 1 })));
        assert_eq!(index.len().await.unwrap(), 0);
    }
}
