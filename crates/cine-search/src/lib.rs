//! CineSense Search - Embedding backfill and semantic search
//!
//! This crate implements the two operations callers use:
//! - Backfill: embed every catalog movie that has no vector yet
//! - Search: rank catalog movies by similarity to free text
//!
//! Both run on top of [`EmbeddingStore`], which pairs the movie catalog
//! with a nearest-neighbor index.
//!
//! Author: hephaex@gmail.com

pub mod backfill;
pub mod facade;
pub mod store;

pub use backfill::{BackfillOrchestrator, BackfillReport};
pub use facade::SearchFacade;
pub use store::EmbeddingStore;
