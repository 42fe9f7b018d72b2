//! Embedding cache decorator
//!
//! Wraps any [`EmbeddingProvider`] and serves repeated texts from a
//! cache keyed by the exact input text instead of re-hitting the
//! upstream model.
//! The wrapper implements the same trait, so callers do not change.
//!
//! Uses the moka crate for thread-safe, async-compatible LRU caching
//! with TTL support.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use cine_core::{EmbeddingConfig, Result};
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::embedding::EmbeddingProvider;

/// Caching wrapper around an embedding provider
#[derive(Clone)]
pub struct CachedEmbedding {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Cache<String, Arc<Vec<f32>>>,
    stats: Arc<CacheStats>,
}

impl CachedEmbedding {
    /// Wrap a provider with explicit capacity and TTL
    pub fn new(inner: Arc<dyn EmbeddingProvider>, max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            inner,
            cache,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Wrap a provider using the embedding configuration
    pub fn from_config(inner: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self::new(
            inner,
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        )
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Get current cache size
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Clear all cached embeddings
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        // Wait for all pending invalidations to complete
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.get(text).await {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit.as_ref().clone());
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        // Failures are not cached; the next call retries upstream.
        let embedding = self.inner.embed(text).await?;
        self.cache
            .insert(text.to_string(), Arc::new(embedding.clone()))
            .await;
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// Hit/miss counters for cache performance monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    /// Get total hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get total misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Fraction of lookups served from cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cine_core::CineError;
    use std::sync::atomic::AtomicUsize;

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text == "fail" {
                return Err(CineError::Provider("upstream down".to_string()));
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn cached() -> (Arc<CountingProvider>, CachedEmbedding) {
        let inner = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let cache = CachedEmbedding::new(inner.clone(), 100, Duration::from_secs(60));
        (inner, cache)
    }

    #[tokio::test]
    async fn test_repeated_text_hits_cache() {
        let (inner, cache) = cached();

        let first = cache.embed("space opera").await.unwrap();
        let second = cache.embed("space opera").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_distinct_text_misses() {
        let (inner, cache) = cached();

        cache.embed("noir").await.unwrap();
        cache.embed("western").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.dimension(), 2);
    }

    #[tokio::test]
    async fn test_each_text_gets_its_own_vector() {
        let (inner, cache) = cached();

        let short = cache.embed("noir").await.unwrap();
        let long = cache.embed("spaghetti western").await.unwrap();
        assert_eq!(cache.embed("noir").await.unwrap(), short);
        assert_eq!(cache.embed("spaghetti western").await.unwrap(), long);

        assert_eq!(short, vec![4.0, 1.0]);
        assert_eq!(long, vec![17.0, 1.0]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let (inner, cache) = cached();

        tokio_test::block_on(async {
            assert!(cache.embed("fail").await.is_err());
            assert!(cache.embed("fail").await.is_err());
        });

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
