//! Movie-to-text projection
//!
//! Renders a catalog record into the single sentence that gets embedded.
//! The template never drops a segment: absent values render as
//! [`UNKNOWN`], so partially populated records still share one layout.

use std::fmt::Display;

use crate::Movie;

/// Placeholder for any value missing from a record
pub const UNKNOWN: &str = "unknown";

/// Render a movie into its embedding input text
pub fn project(movie: &Movie) -> String {
    let plot = movie
        .fullplot
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .or_else(|| movie.plot.as_deref().filter(|p| !p.trim().is_empty()))
        .unwrap_or(UNKNOWN);

    let rating = movie.imdb.and_then(|imdb| imdb.rating);
    let votes = movie.imdb.and_then(|imdb| imdb.votes);

    format!(
        "{}: {}. Plot: {} Genres: {}. Cast: {}. Directors: {}. Languages: {}. Year: {}. Runtime: {}. IMDB Rating: {}. IMDB Votes: {}.",
        movie.content_type,
        movie.title,
        plot,
        join_or_unknown(movie.genres.as_deref()),
        join_or_unknown(movie.cast.as_deref()),
        join_or_unknown(movie.directors.as_deref()),
        join_or_unknown(movie.languages.as_deref()),
        or_unknown(movie.year),
        or_unknown(movie.runtime),
        or_unknown(rating),
        or_unknown(votes),
    )
}

fn join_or_unknown(values: Option<&[String]>) -> String {
    match values {
        Some(values) if !values.is_empty() => values.join(", "),
        _ => UNKNOWN.to_string(),
    }
}

fn or_unknown<T: Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}
