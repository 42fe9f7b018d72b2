//! Embedding backfill
//!
//! Brings every movie without an embedding up to date. Movies are taken
//! in id order and split into chunks. Chunks run one after another; the
//! movies inside a chunk are projected, embedded and attached
//! concurrently, so at most `chunk_size` provider calls are in flight.
//!
//! A failed movie fails its chunk once the whole chunk has settled, and
//! the run stops there. Nothing is retried here: attached vectors stay
//! committed and the next run picks up only what is still missing.

use cine_core::{project, BackfillConfig, CineError, EmbeddingFailure, Movie, Result};
use cine_vector::EmbeddingProvider;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::store::EmbeddingStore;

/// Summary of a successful backfill run
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    /// Movies without an embedding when the run started
    pub found: usize,

    /// Movies embedded and attached
    pub processed: usize,

    /// Size of each chunk, in processing order
    pub chunk_sizes: Vec<usize>,

    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

/// Drives bulk embedding of movies missing a vector
pub struct BackfillOrchestrator {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<EmbeddingStore>,
    chunk_size: usize,
}

impl BackfillOrchestrator {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<EmbeddingStore>,
        config: &BackfillConfig,
    ) -> Self {
        Self {
            provider,
            store,
            chunk_size: config.chunk_size.max(1),
        }
    }

    /// Override the chunk size (values below 1 are raised to 1)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Embed every movie that does not have a vector yet
    pub async fn run(&self) -> Result<BackfillReport> {
        let start = Instant::now();

        let missing = self.store.find_missing_embeddings().await?;
        tracing::info!("Found {} titles without embeddings", missing.len());

        let mut report = BackfillReport {
            found: missing.len(),
            ..Default::default()
        };
        let total_chunks = missing.len().div_ceil(self.chunk_size);

        for (position, chunk) in missing.chunks(self.chunk_size).enumerate() {
            let chunk_number = position + 1;
            tracing::debug!(
                chunk = chunk_number,
                total_chunks,
                size = chunk.len(),
                "Embedding chunk"
            );

            let outcomes = join_all(chunk.iter().map(|movie| async move {
                (movie, self.embed_movie(movie).await)
            }))
            .await;

            let mut failures = Vec::new();
            for (movie, outcome) in outcomes {
                match outcome {
                    Ok(()) => report.processed += 1,
                    Err(e) => failures.push(EmbeddingFailure {
                        movie_id: movie.id,
                        title: movie.title.clone(),
                        reason: e.to_string(),
                    }),
                }
            }
            report.chunk_sizes.push(chunk.len());

            if !failures.is_empty() {
                tracing::error!(
                    chunk = chunk_number,
                    failed = failures.len(),
                    attempted = chunk.len(),
                    processed = report.processed,
                    "Backfill chunk failed; re-run backfill to resume"
                );
                return Err(CineError::BackfillFailed {
                    chunk: chunk_number,
                    attempted: chunk.len(),
                    failures,
                });
            }
        }

        report.elapsed = start.elapsed();
        tracing::info!(
            chunks = report.chunk_sizes.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Added embedding for {} documents",
            report.processed
        );
        Ok(report)
    }

    async fn embed_movie(&self, movie: &Movie) -> Result<()> {
        let input = project(movie);
        let embedding = self.provider.embed(&input).await?;
        tracing::debug!(movie_id = %movie.id, title = %movie.title, "Adding embedding");
        self.store.attach_vector(movie.id, &embedding).await
    }
}
