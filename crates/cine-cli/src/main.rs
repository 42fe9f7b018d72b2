//! CineSense CLI - Command-line interface
//!
//! Usage:
//!   cinesense init
//!   cinesense backfill [--chunk-size N]
//!   cinesense search <query> [--limit N] [--json]
//!   cinesense shell
//!   cinesense reindex
//!   cinesense status

use anyhow::Context;
use cine_core::{AppConfig, IndexBackend, LoggingConfig, PgMovieCatalog, ScoredMovie};
use cine_search::{BackfillOrchestrator, EmbeddingStore, SearchFacade};
use cine_vector::embedding::model_dimension;
use cine_vector::{
    CachedEmbedding, EmbeddingProvider, InMemoryIndex, OpenAiEmbedding, QdrantIndex, VectorIndex,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "cinesense")]
#[command(about = "Semantic movie search CLI")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (environment variables still override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the movies table and the vector collection
    Init,
    /// Embed every movie that has no embedding yet
    Backfill {
        /// Movies embedded concurrently per chunk
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Search movies by meaning
    Search {
        /// Free-text description of what to find
        query: String,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Read queries from stdin, one per line
    Shell,
    /// Copy stored embeddings from the catalog into the vector index
    Reindex,
    /// Show embedding coverage
    Status,
}

/// Everything a command needs, wired from configuration
struct Pipeline {
    config: AppConfig,
    catalog: Arc<PgMovieCatalog>,
    store: Arc<EmbeddingStore>,
    qdrant: Option<Arc<QdrantIndex>>,
}

impl Pipeline {
    async fn connect(config: AppConfig) -> anyhow::Result<Self> {
        let dimension = config
            .embedding
            .dimension
            .unwrap_or_else(|| model_dimension(&config.embedding.model));

        let catalog = Arc::new(PgMovieCatalog::new(&config.database).await?);

        let (index, qdrant) = match config.database.index_backend {
            IndexBackend::Qdrant => {
                let qdrant = Arc::new(QdrantIndex::new(&config.database, dimension)?);
                let index: Arc<dyn VectorIndex> = qdrant.clone();
                (index, Some(qdrant))
            }
            IndexBackend::Memory => {
                let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new(dimension));
                (index, None)
            }
        };

        let store = Arc::new(EmbeddingStore::new(catalog.clone(), index, dimension));
        tracing::debug!(
            index = store.index_name(),
            dimension,
            model = %config.embedding.model,
            "Pipeline connected"
        );

        Ok(Self {
            config,
            catalog,
            store,
            qdrant,
        })
    }

    /// The in-memory index starts empty and must be loaded from the catalog
    async fn warm_index(&self) -> anyhow::Result<()> {
        if self.qdrant.is_none() {
            self.store.rebuild_index().await?;
        }
        Ok(())
    }

    /// Only commands that call the model need an API key
    fn provider(&self) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::new(OpenAiEmbedding::from_config(&self.config.embedding)?))
    }

    fn facade(&self) -> anyhow::Result<SearchFacade> {
        let provider = self.provider()?;
        let provider: Arc<dyn EmbeddingProvider> = if self.config.embedding.cache_enabled {
            Arc::new(CachedEmbedding::from_config(provider, &self.config.embedding))
        } else {
            provider
        };
        Ok(SearchFacade::new(
            provider,
            self.store.clone(),
            self.config.search.clone(),
        ))
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?
            .with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.clone().into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location)
        .with_writer(std::io::stderr);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_results(results: &[ScoredMovie], json: bool) -> anyhow::Result<()> {
    if json {
        let stripped: Vec<ScoredMovie> = results
            .iter()
            .cloned()
            .map(|mut hit| {
                hit.movie.embedding = None;
                hit
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&stripped)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No movies found.");
        return Ok(());
    }

    for (rank, hit) in results.iter().enumerate() {
        let movie = &hit.movie;
        let year = movie
            .year
            .map(|y| format!(" ({y})"))
            .unwrap_or_default();
        println!("{:>3}. [{:.3}] {}{}", rank + 1, hit.score, movie.title, year);

        if let Some(plot) = movie.plot.as_deref() {
            println!("     {plot}");
        }
        if let Some(cast) = movie.cast.as_ref().filter(|c| !c.is_empty()) {
            println!("     Cast: {}", cast.join(", "));
        }
        if let Some(rating) = movie.imdb.and_then(|imdb| imdb.rating) {
            let votes = movie
                .imdb
                .and_then(|imdb| imdb.votes)
                .map(|v| format!(" from {v} votes"))
                .unwrap_or_default();
            println!("     IMDB: {rating}{votes}");
        }
        println!(
            "     Poster: {}",
            movie.poster.as_deref().unwrap_or("(no poster)")
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    init_tracing(&config.logging);

    let pipeline = Pipeline::connect(config).await?;

    match cli.command {
        Commands::Init => {
            pipeline.catalog.ensure_schema().await?;
            if let Some(qdrant) = &pipeline.qdrant {
                qdrant.init_collection().await?;
            }
            println!("Schema ready.");
        }
        Commands::Backfill { chunk_size } => {
            let mut orchestrator = BackfillOrchestrator::new(
                pipeline.provider()?,
                pipeline.store.clone(),
                &pipeline.config.backfill,
            );
            if let Some(size) = chunk_size {
                orchestrator = orchestrator.with_chunk_size(size);
            }

            let report = orchestrator.run().await?;
            println!(
                "Embedded {} of {} movies in {} chunks ({:.1}s).",
                report.processed,
                report.found,
                report.chunk_sizes.len(),
                report.elapsed.as_secs_f64()
            );
        }
        Commands::Search { query, limit, json } => {
            pipeline.warm_index().await?;
            let facade = pipeline.facade()?;
            let results = match limit {
                Some(limit) => facade.search_by_text_with_limit(&query, limit).await?,
                None => facade.search_by_text(&query).await?,
            };
            print_results(&results, json)?;
        }
        Commands::Shell => {
            pipeline.warm_index().await?;
            let facade = pipeline.facade()?;
            let mut lines = BufReader::new(tokio::io::stdin()).lines();

            while let Some(line) = lines.next_line().await? {
                match facade.search_by_text(&line).await {
                    Ok(results) => print_results(&results, false)?,
                    Err(cine_core::CineError::InvalidQuery(reason)) => {
                        eprintln!("Please enter a search: {reason}");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Commands::Reindex => {
            let indexed = pipeline.store.rebuild_index().await?;
            println!(
                "Indexed {indexed} embeddings into {}.",
                pipeline.store.index_name()
            );
        }
        Commands::Status => {
            pipeline.warm_index().await?;
            let stats = pipeline.store.stats().await?;
            let indexed = pipeline.store.index_len().await?;
            println!("Movies:    {}", stats.total);
            println!("Embedded:  {}", stats.embedded);
            println!("Missing:   {}", stats.missing);
            println!("Indexed:   {indexed} ({})", pipeline.store.index_name());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "cinesense",
            "--config",
            "cinesense.toml",
            "search",
            "space heist",
            "--limit",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("cinesense.toml")));
        match cli.command {
            Commands::Search { query, limit, json } => {
                assert_eq!(query, "space heist");
                assert_eq!(limit, Some(5));
                assert!(!json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn test_parse_backfill_chunk_size() {
        let cli = Cli::try_parse_from(["cinesense", "backfill", "--chunk-size", "25"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Backfill {
                chunk_size: Some(25)
            }
        ));
    }
}
