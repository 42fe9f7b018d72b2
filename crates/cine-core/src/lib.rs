//! CineSense Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout CineSense:
//! - Movie catalog records and their embeddings
//! - Search queries and ranked results
//! - Common error types
//! - Configuration management
//! - Catalog storage (PostgreSQL and in-memory)
//! - Record-to-text projection for embedding

pub mod catalog;
pub mod config;
pub mod projection;

pub use catalog::{InMemoryCatalog, MovieCatalog, PgMovieCatalog};
pub use config::{
    AppConfig, BackfillConfig, ConfigError, DatabaseConfig, EmbeddingConfig, IndexBackend,
    LoggingConfig, SearchConfig,
};
pub use projection::{project, UNKNOWN};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for CineSense operations
#[derive(Error, Debug)]
pub enum CineError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Movie not found: {0}")]
    NotFound(Uuid),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding component {position} is not a finite number")]
    NonFiniteVector { position: usize },

    #[error(
        "Backfill chunk {chunk} failed: {} of {attempted} movies could not be embedded",
        .failures.len()
    )]
    BackfillFailed {
        chunk: usize,
        attempted: usize,
        failures: Vec<EmbeddingFailure>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CineError>;

/// A single movie whose embedding could not be produced or stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingFailure {
    pub movie_id: Uuid,
    pub title: String,
    pub reason: String,
}

/// Reject a vector whose length differs from the expected dimension or
/// that holds NaN or infinite components
pub fn ensure_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(CineError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    if let Some(position) = vector.iter().position(|x| !x.is_finite()) {
        return Err(CineError::NonFiniteVector { position });
    }
    Ok(())
}

// ============================================================================
// Catalog Models
// ============================================================================

/// IMDB rating metadata attached to a movie
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImdbRating {
    /// Average score (0.0 - 10.0)
    pub rating: Option<f32>,

    /// Number of votes behind the score
    pub votes: Option<i64>,
}

/// A movie in the catalog
///
/// Records are created by an external ingestion process without an
/// embedding. The backfill pipeline attaches one later; after that the
/// record is eligible for similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    /// Unique, stable identifier
    pub id: Uuid,

    /// Content type (movie, series, ...)
    #[serde(rename = "type", default = "default_content_type")]
    pub content_type: String,

    pub title: String,

    /// Short plot summary
    #[serde(default)]
    pub plot: Option<String>,

    /// Long-form synopsis, preferred over `plot` when present
    #[serde(default)]
    pub fullplot: Option<String>,

    #[serde(default)]
    pub genres: Option<Vec<String>>,

    /// Cast members in billing order
    #[serde(default)]
    pub cast: Option<Vec<String>>,

    #[serde(default)]
    pub directors: Option<Vec<String>>,

    #[serde(default)]
    pub languages: Option<Vec<String>>,

    #[serde(default)]
    pub countries: Option<Vec<String>>,

    #[serde(default)]
    pub year: Option<i32>,

    /// Runtime in minutes
    #[serde(default)]
    pub runtime: Option<i32>,

    #[serde(default)]
    pub imdb: Option<ImdbRating>,

    /// Poster image URL. Never synthesized when absent.
    #[serde(default)]
    pub poster: Option<String>,

    /// Audience rating label (PG-13, R, ...)
    #[serde(default)]
    pub rated: Option<String>,

    #[serde(default)]
    pub released: Option<DateTime<Utc>>,

    /// Embedding vector, absent until backfilled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

fn default_content_type() -> String {
    "movie".to_string()
}

impl Movie {
    /// Create a new movie with only a title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_type: default_content_type(),
            title: title.into(),
            plot: None,
            fullplot: None,
            genres: None,
            cast: None,
            directors: None,
            languages: None,
            countries: None,
            year: None,
            runtime: None,
            imdb: None,
            poster: None,
            rated: None,
            released: None,
            embedding: None,
        }
    }

    /// Set the identifier
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Set short plot
    pub fn with_plot(mut self, plot: impl Into<String>) -> Self {
        self.plot = Some(plot.into());
        self
    }

    /// Set genres
    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = Some(genres.into_iter().map(Into::into).collect());
        self
    }

    /// Set cast
    pub fn with_cast<I, S>(mut self, cast: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cast = Some(cast.into_iter().map(Into::into).collect());
        self
    }

    /// Set release year
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Set embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Whether this record already carries an embedding
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

// ============================================================================
// Search Types
// ============================================================================

/// A validated free-text search query
///
/// Only non-blank text can be turned into a query; the check happens
/// before any embedding request is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery(String);

impl SearchQuery {
    /// Validate raw user input
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CineError::InvalidQuery(
                "search text must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A movie returned from similarity search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMovie {
    pub movie: Movie,

    /// Similarity to the query vector (higher is closer)
    pub score: f32,
}

/// Embedding coverage of the catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub total: u64,
    pub embedded: u64,
    pub missing: u64,
}

// ============================================================================
// Tests
// ============================================================================
