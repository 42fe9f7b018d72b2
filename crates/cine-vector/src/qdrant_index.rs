//! Qdrant implementation for vector search
//!
//! Provides connection management and HNSW nearest-neighbor search over
//! movie embeddings. Point ids are the movie UUIDs; the catalog remains
//! the source of truth for record data, so points carry no payload.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use cine_core::{ensure_dimension, CineError, DatabaseConfig, Result};
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, PointId,
    PointStruct, PointsIdsList, ScoredPoint, SearchParamsBuilder, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use uuid::Uuid;

use crate::{ScoredId, VectorIndex};

/// Qdrant vector index implementation
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantIndex {
    /// Create a new Qdrant connection
    pub fn new(config: &DatabaseConfig, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(&config.qdrant_url)
            .build()
            .map_err(|e| CineError::Store(format!("Qdrant connection failed: {e}")))?;

        Ok(Self {
            client,
            collection: config.qdrant_collection.clone(),
            dimension,
        })
    }

    /// Initialize collection (run once on setup)
    pub async fn init_collection(&self) -> Result<()> {
        // Check if collection exists
        let collections =
            self.client.list_collections().await.map_err(|e| {
                CineError::Store(format!("Failed to list collections: {e}"))
            })?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            tracing::info!(
                collection = %self.collection,
                dimension = self.dimension,
                "Creating Qdrant collection"
            );
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| CineError::Store(format!("Failed to create collection: {e}")))?;
        }

        Ok(())
    }
}

fn point_uuid(point: &ScoredPoint) -> Option<Uuid> {
    match point.id.as_ref()?.point_id_options.as_ref()? {
        PointIdOptions::Uuid(raw) => Uuid::parse_str(raw).ok(),
        PointIdOptions::Num(_) => None,
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, id: Uuid, vector: &[f32]) -> Result<()> {
        ensure_dimension(vector, self.dimension)?;

        let point = PointStruct::new(id.to_string(), vector.to_vec(), Payload::new());

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| CineError::Store(format!("Failed to upsert vector: {e}")))?;

        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        let ids = PointsIdsList {
            ids: vec![PointId::from(id.to_string())],
        };

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(ids)
                    .wait(true),
            )
            .await
            .map_err(|e| CineError::Store(format!("Failed to delete vector: {e}")))?;

        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        num_candidates: usize,
        limit: usize,
    ) -> Result<Vec<ScoredId>> {
        ensure_dimension(query_vector, self.dimension)?;

        // hnsw_ef is the candidate list size; it must cover the limit.
        let ef = num_candidates.max(limit) as u64;

        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query_vector.to_vec(), limit as u64)
                    .with_payload(false)
                    .params(SearchParamsBuilder::default().hnsw_ef(ef)),
            )
            .await
            .map_err(|e| CineError::Store(format!("Vector search failed: {e}")))?;

        let hits = results
            .result
            .iter()
            .filter_map(|point| match point_uuid(point) {
                Some(id) => Some(ScoredId {
                    id,
                    score: point.score,
                }),
                None => {
                    tracing::warn!(point = ?point.id, "Skipping point with non-UUID id");
                    None
                }
            })
            .collect();

        Ok(hits)
    }

    async fn len(&self) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(|e| CineError::Store(format!("Failed to count vectors: {e}")))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(id: Option<PointIdOptions>) -> ScoredPoint {
        ScoredPoint {
            id: id.map(|options| PointId {
                point_id_options: Some(options),
            }),
            score: 0.9,
            ..Default::default()
        }
    }

    #[test]
    fn test_point_uuid_extraction() {
        let id = Uuid::new_v4();
        assert_eq!(
            point_uuid(&scored(Some(PointIdOptions::Uuid(id.to_string())))),
            Some(id)
        );
        assert_eq!(point_uuid(&scored(Some(PointIdOptions::Num(7)))), None);
        assert_eq!(point_uuid(&scored(None)), None);
    }

    #[test]
    fn test_new_does_not_connect() {
        let index = QdrantIndex::new(&DatabaseConfig::default(), 1536).unwrap();
        assert_eq!(index.name(), "qdrant");
        assert_eq!(index.collection, "movies");
    }
}
