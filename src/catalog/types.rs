use serde::{Deserialize, Serialize};

/// Placeholder the catalog API uses for fields it has no value for.
pub const MISSING_VALUE: &str = "N/A";

// ============================================================================
// Movie Summary
// ============================================================================

/// One search hit from the catalog API.
///
/// Immutable once fetched. Identity is `id`; two summaries with the same id
/// describe the same movie even if other fields differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieSummary {
    #[serde(rename = "imdbID")]
    pub id: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year", default)]
    pub year: String,
    #[serde(rename = "Poster", default)]
    pub poster_url: String,
    #[serde(rename = "Type", default)]
    pub kind: String,
}

impl MovieSummary {
    /// Poster URL, or `None` when the catalog has no poster for this movie.
    pub fn poster(&self) -> Option<&str> {
        present(&self.poster_url)
    }

    /// Leading numeric part of the release year.
    ///
    /// Series use ranges like `"2008–2013"`; only the first year counts.
    pub fn release_year(&self) -> Option<u32> {
        leading_year(&self.year)
    }
}

/// Parses the leading digits of a year field. `"2008–2013"` yields 2008,
/// `"N/A"` and `""` yield `None`.
pub fn leading_year(year: &str) -> Option<u32> {
    let trimmed = year.trim_start();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

fn present(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() || value == MISSING_VALUE {
        None
    } else {
        Some(value)
    }
}

// ============================================================================
// Category Configuration
// ============================================================================

/// A named slice of the catalog produced by one fixed search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpec {
    pub label: String,
    #[serde(rename = "query")]
    pub query_term: String,
}

impl CategorySpec {
    pub fn new(label: impl Into<String>, query_term: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            query_term: query_term.into(),
        }
    }

    /// The categories shown on the home page when none are configured.
    pub fn defaults() -> Vec<CategorySpec> {
        vec![
            CategorySpec::new("Action Movies", "action"),
            CategorySpec::new("Comedy Movies", "comedy"),
            CategorySpec::new("Adventure Movies", "adventure"),
            CategorySpec::new("Movies for Kids", "kids"),
            CategorySpec::new("Thriller Movies", "thriller"),
            CategorySpec::new("Drama Movies", "drama"),
            CategorySpec::new("Sci-Fi Movies", "sci-fi"),
        ]
    }
}

// ============================================================================
// Movie Detail
// ============================================================================

/// A single rating source on the detail record (e.g. "Rotten Tomatoes", "94%").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// Full detail record for one movie.
///
/// Free-text fields keep the catalog's raw strings; accessors filter out the
/// `"N/A"` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieDetail {
    #[serde(rename = "imdbID")]
    pub id: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Year", default)]
    pub year: String,
    #[serde(rename = "Rated", default)]
    pub rated: String,
    #[serde(rename = "Released", default)]
    pub released: String,
    #[serde(rename = "Runtime", default)]
    pub runtime: String,
    #[serde(rename = "Genre", default)]
    pub genre: String,
    #[serde(rename = "Director", default)]
    pub director: String,
    #[serde(rename = "Writer", default)]
    pub writer: String,
    #[serde(rename = "Actors", default)]
    pub actors: String,
    #[serde(rename = "Plot", default)]
    pub plot: String,
    #[serde(rename = "Language", default)]
    pub language: String,
    #[serde(rename = "Country", default)]
    pub country: String,
    #[serde(rename = "Awards", default)]
    pub awards: String,
    #[serde(rename = "Poster", default)]
    pub poster_url: String,
    #[serde(rename = "Ratings", default)]
    pub ratings: Vec<Rating>,
    #[serde(rename = "imdbRating", default)]
    pub imdb_rating: String,
    #[serde(rename = "imdbVotes", default)]
    pub imdb_votes: String,
    #[serde(rename = "Type", default)]
    pub kind: String,
}

impl MovieDetail {
    pub fn genres(&self) -> Vec<&str> {
        present(&self.genre)
            .map(|g| g.split(", ").map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn plot(&self) -> Option<&str> {
        present(&self.plot)
    }

    pub fn director(&self) -> Option<&str> {
        present(&self.director)
    }

    pub fn actors(&self) -> Option<&str> {
        present(&self.actors)
    }

    pub fn runtime(&self) -> Option<&str> {
        present(&self.runtime)
    }

    pub fn imdb_rating(&self) -> Option<&str> {
        present(&self.imdb_rating)
    }

    pub fn poster(&self) -> Option<&str> {
        present(&self.poster_url)
    }

    /// The summary fields stored when this movie is favorited from its
    /// detail page.
    pub fn summary(&self) -> MovieSummary {
        MovieSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            year: self.year.clone(),
            poster_url: self.poster_url.clone(),
            kind: self.kind.clone(),
        }
    }
}

// ============================================================================
// Wire Envelopes
// ============================================================================

/// Search response envelope: `{ "Search": [...] }` or
/// `{ "Response": "False", "Error": "..." }`.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchEnvelope {
    #[serde(rename = "Search", default)]
    pub search: Option<Vec<MovieSummary>>,
    #[serde(rename = "Response", default)]
    pub response: Option<String>,
    #[serde(rename = "Error", default)]
    pub error: Option<String>,
}

/// Detail lookups return the record inline, with `Response: "False"` as the
/// not-found marker.
#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMarker {
    #[serde(rename = "Response", default)]
    pub response: Option<String>,
    #[serde(rename = "Error", default)]
    pub error: Option<String>,
}

impl ResponseMarker {
    pub(crate) fn is_false(&self) -> bool {
        self.response
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("false"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_year_handles_ranges_and_placeholders() {
        assert_eq!(leading_year("1999"), Some(1999));
        assert_eq!(leading_year("2008–2013"), Some(2008));
        assert_eq!(leading_year("2019–"), Some(2019));
        assert_eq!(leading_year("N/A"), None);
        assert_eq!(leading_year(""), None);
    }

    #[test]
    fn test_poster_placeholder_is_none() {
        let movie = MovieSummary {
            id: "tt1".into(),
            title: "Untitled".into(),
            year: "2001".into(),
            poster_url: "N/A".into(),
            kind: "movie".into(),
        };
        assert_eq!(movie.poster(), None);
    }

    #[test]
    fn test_summary_deserializes_catalog_field_names() {
        let json = r#"{"Title":"Alien","Year":"1979","imdbID":"tt0078748","Type":"movie","Poster":"https://img.example/alien.jpg"}"#;
        let movie: MovieSummary = serde_json::from_str(json).unwrap();
        assert_eq!(movie.id, "tt0078748");
        assert_eq!(movie.title, "Alien");
        assert_eq!(movie.poster(), Some("https://img.example/alien.jpg"));
        assert_eq!(movie.release_year(), Some(1979));
    }

    #[test]
    fn test_detail_genres_split() {
        let json = r#"{
            "Title":"Alien","Year":"1979","imdbID":"tt0078748","Type":"movie",
            "Genre":"Horror, Sci-Fi","Plot":"N/A",
            "Ratings":[{"Source":"Internet Movie Database","Value":"8.5/10"}]
        }"#;
        let detail: MovieDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.genres(), vec!["Horror", "Sci-Fi"]);
        assert_eq!(detail.plot(), None);
        assert_eq!(detail.ratings.len(), 1);
        assert_eq!(detail.summary().id, "tt0078748");
    }

    #[test]
    fn test_default_categories_have_unique_labels() {
        let defaults = CategorySpec::defaults();
        let mut labels: Vec<_> = defaults.iter().map(|c| c.label.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), defaults.len());
    }
}
