//! Movie catalog storage
//!
//! Holds catalog records together with their embeddings. The PostgreSQL
//! store keeps the vector in a nullable `REAL[]` column; a partial index
//! over rows without one keeps the backfill scan cheap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::{CineError, DatabaseConfig, EmbeddingStats, ImdbRating, Movie, Result};

/// Trait for catalog operations used by the embedding pipeline
#[async_trait]
pub trait MovieCatalog: Send + Sync {
    /// Movies without an embedding, ascending by id
    async fn find_missing_embeddings(&self) -> Result<Vec<Movie>>;

    /// Replace the embedding of exactly one movie
    ///
    /// Fails with [`CineError::NotFound`] when no movie has this id.
    async fn set_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<()>;

    /// Fetch movies by id; unknown ids are skipped, order is unspecified
    async fn get_movies(&self, ids: &[Uuid]) -> Result<Vec<Movie>>;

    /// Page through stored embeddings in ascending id order, starting after `after`
    async fn list_embeddings(
        &self,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<(Uuid, Vec<f32>)>>;

    /// Embedding coverage counts
    async fn embedding_stats(&self) -> Result<EmbeddingStats>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// PostgreSQL movie catalog
pub struct PgMovieCatalog {
    pool: PgPool,
}

impl PgMovieCatalog {
    /// Create a new catalog connection
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.postgres_pool_size)
            .connect(&config.postgres_url)
            .await
            .map_err(|e| CineError::Store(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the movies table and its indexes if they do not exist
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS movies (
                id UUID PRIMARY KEY,
                content_type TEXT NOT NULL DEFAULT 'movie',
                title TEXT NOT NULL,
                plot TEXT,
                fullplot TEXT,
                genres TEXT[],
                cast_members TEXT[],
                directors TEXT[],
                languages TEXT[],
                countries TEXT[],
                year INTEGER,
                runtime INTEGER,
                imdb_rating REAL,
                imdb_votes BIGINT,
                poster TEXT,
                rated TEXT,
                released TIMESTAMPTZ,
                embedding REAL[]
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CineError::Store(format!("Failed to create movies table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS movies_missing_embedding_idx ON movies (id) WHERE embedding IS NULL",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CineError::Store(format!("Failed to create embedding index: {e}")))?;

        Ok(())
    }
}

/// Movie row from database
#[derive(Debug, FromRow)]
struct MovieRow {
    id: Uuid,
    content_type: String,
    title: String,
    plot: Option<String>,
    fullplot: Option<String>,
    genres: Option<Vec<String>>,
    cast_members: Option<Vec<String>>,
    directors: Option<Vec<String>>,
    languages: Option<Vec<String>>,
    countries: Option<Vec<String>>,
    year: Option<i32>,
    runtime: Option<i32>,
    imdb_rating: Option<f32>,
    imdb_votes: Option<i64>,
    poster: Option<String>,
    rated: Option<String>,
    released: Option<DateTime<Utc>>,
    embedding: Option<Vec<f32>>,
}

impl From<MovieRow> for Movie {
    fn from(row: MovieRow) -> Self {
        let imdb = match (row.imdb_rating, row.imdb_votes) {
            (None, None) => None,
            (rating, votes) => Some(ImdbRating { rating, votes }),
        };

        Movie {
            id: row.id,
            content_type: row.content_type,
            title: row.title,
            plot: row.plot,
            fullplot: row.fullplot,
            genres: row.genres,
            cast: row.cast_members,
            directors: row.directors,
            languages: row.languages,
            countries: row.countries,
            year: row.year,
            runtime: row.runtime,
            imdb,
            poster: row.poster,
            rated: row.rated,
            released: row.released,
            embedding: row.embedding,
        }
    }
}

const MOVIE_COLUMNS: &str = "id, content_type, title, plot, fullplot, genres, cast_members, \
     directors, languages, countries, year, runtime, imdb_rating, imdb_votes, poster, rated, \
     released, embedding";

#[async_trait]
impl MovieCatalog for PgMovieCatalog {
    async fn find_missing_embeddings(&self) -> Result<Vec<Movie>> {
        let sql = format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE embedding IS NULL ORDER BY id");
        let rows: Vec<MovieRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CineError::Store(format!("Failed to list movies without embeddings: {e}")))?;

        Ok(rows.into_iter().map(Movie::from).collect())
    }

    async fn set_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<()> {
        let result = sqlx::query("UPDATE movies SET embedding = $2 WHERE id = $1")
            .bind(id)
            .bind(embedding.to_vec())
            .execute(&self.pool)
            .await
            .map_err(|e| CineError::Store(format!("Failed to store embedding: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(CineError::NotFound(id));
        }
        Ok(())
    }

    async fn get_movies(&self, ids: &[Uuid]) -> Result<Vec<Movie>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE id = ANY($1)");
        let rows: Vec<MovieRow> = sqlx::query_as(&sql)
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CineError::Store(format!("Failed to fetch movies: {e}")))?;

        Ok(rows.into_iter().map(Movie::from).collect())
    }

    async fn list_embeddings(
        &self,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<(Uuid, Vec<f32>)>> {
        let rows: Vec<(Uuid, Vec<f32>)> = sqlx::query_as(
            r#"
            SELECT id, embedding
            FROM movies
            WHERE embedding IS NOT NULL AND ($1::uuid IS NULL OR id > $1)
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CineError::Store(format!("Failed to page embeddings: {e}")))?;

        Ok(rows)
    }

    async fn embedding_stats(&self) -> Result<EmbeddingStats> {
        let (total, embedded): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(embedding) FROM movies",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CineError::Store(format!("Failed to count movies: {e}")))?;

        Ok(EmbeddingStats {
            total: total as u64,
            embedded: embedded as u64,
            missing: (total - embedded) as u64,
        })
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Catalog held in process memory, ordered by id
///
/// Used for local runs and tests; behaves like the PostgreSQL catalog.
#[derive(Default)]
pub struct InMemoryCatalog {
    movies: RwLock<BTreeMap<Uuid, Movie>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from existing records
    pub fn with_movies(movies: impl IntoIterator<Item = Movie>) -> Self {
        let catalog = Self::new();
        for movie in movies {
            catalog.insert(movie);
        }
        catalog
    }

    /// Insert or replace a record
    pub fn insert(&self, movie: Movie) {
        self.write().insert(movie.id, movie);
    }

    /// Fetch one record
    pub fn get(&self, id: Uuid) -> Option<Movie> {
        self.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<Uuid, Movie>> {
        self.movies.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<Uuid, Movie>> {
        self.movies.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MovieCatalog for InMemoryCatalog {
    async fn find_missing_embeddings(&self) -> Result<Vec<Movie>> {
        Ok(self
            .read()
            .values()
            .filter(|movie| !movie.has_embedding())
            .cloned()
            .collect())
    }

    async fn set_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<()> {
        let mut movies = self.write();
        let movie = movies.get_mut(&id).ok_or(CineError::NotFound(id))?;
        movie.embedding = Some(embedding.to_vec());
        Ok(())
    }

    async fn get_movies(&self, ids: &[Uuid]) -> Result<Vec<Movie>> {
        let movies = self.read();
        Ok(ids.iter().filter_map(|id| movies.get(id).cloned()).collect())
    }

    async fn list_embeddings(
        &self,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<(Uuid, Vec<f32>)>> {
        let movies = self.read();
        let page = movies
            .values()
            .filter(|movie| after.map_or(true, |after| movie.id > after))
            .filter_map(|movie| movie.embedding.clone().map(|e| (movie.id, e)))
            .take(limit)
            .collect();
        Ok(page)
    }

    async fn embedding_stats(&self) -> Result<EmbeddingStats> {
        let movies = self.read();
        let total = movies.len() as u64;
        let embedded = movies.values().filter(|m| m.has_embedding()).count() as u64;
        Ok(EmbeddingStats {
            total,
            embedded,
            missing: total - embedded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> InMemoryCatalog {
        InMemoryCatalog::with_movies([
            Movie::new("Heat"),
            Movie::new("Ronin").with_embedding(vec![1.0, 0.0]),
            Movie::new("Collateral"),
        ])
    }

    #[test]
    fn test_movie_row_conversion() {
        let row = MovieRow {
            id: Uuid::new_v4(),
            content_type: "movie".to_string(),
            title: "Heat".to_string(),
            plot: None,
            fullplot: None,
            genres: Some(vec!["Crime".to_string()]),
            cast_members: Some(vec!["Al Pacino".to_string(), "Robert De Niro".to_string()]),
            directors: None,
            languages: None,
            countries: None,
            year: Some(1995),
            runtime: Some(170),
            imdb_rating: Some(8.3),
            imdb_votes: None,
            poster: None,
            rated: Some("R".to_string()),
            released: None,
            embedding: None,
        };

        let movie = Movie::from(row);
        assert_eq!(movie.cast.as_ref().map(Vec::len), Some(2));
        assert_eq!(movie.imdb.and_then(|i| i.rating), Some(8.3));
        assert!(movie.imdb.and_then(|i| i.votes).is_none());
    }

    #[test]
    fn test_find_missing_is_ordered_and_excludes_embedded() {
        let catalog = sample_catalog();
        let missing = tokio_test::block_on(catalog.find_missing_embeddings()).unwrap();

        assert_eq!(missing.len(), 2);
        assert!(missing.iter().all(|m| !m.has_embedding()));
        assert!(missing.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_set_embedding_unknown_id() {
        let catalog = sample_catalog();
        let missing_id = Uuid::new_v4();
        let result = tokio_test::block_on(catalog.set_embedding(missing_id, &[0.5, 0.5]));
        assert!(matches!(result, Err(CineError::NotFound(id)) if id == missing_id));
    }

    #[tokio::test]
    async fn test_set_embedding_removes_from_missing() {
        let catalog = sample_catalog();
        let target = catalog.find_missing_embeddings().await.unwrap()[0].id;

        catalog.set_embedding(target, &[0.0, 1.0]).await.unwrap();

        let missing = catalog.find_missing_embeddings().await.unwrap();
        assert!(missing.iter().all(|m| m.id != target));
        assert_eq!(catalog.get(target).unwrap().embedding, Some(vec![0.0, 1.0]));

        let stats = catalog.embedding_stats().await.unwrap();
        assert_eq!(
            stats,
            EmbeddingStats {
                total: 3,
                embedded: 2,
                missing: 1
            }
        );
    }

    #[tokio::test]
    async fn test_list_embeddings_pages_in_order() {
        let catalog = InMemoryCatalog::with_movies(
            (0..5).map(|i| Movie::new(format!("Movie {i}")).with_embedding(vec![i as f32])),
        );

        let first = catalog.list_embeddings(None, 3).await.unwrap();
        assert_eq!(first.len(), 3);
        let rest = catalog.list_embeddings(Some(first[2].0), 3).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert!(rest[0].0 > first[2].0);
    }
}
