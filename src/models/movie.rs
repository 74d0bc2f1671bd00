use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Stable catalog identifier of a movie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieId(pub i64);

impl Display for MovieId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MovieId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(MovieId)
    }
}

/// Per-title attributes as collected from the movie catalog
///
/// `vote_average` is kept on the catalog's 0-10 scale; the encoder normalizes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieRecord {
    pub id: MovieId,
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Top-billed cast, in billing order
    #[serde(default)]
    pub cast: Vec<String>,
    /// Empty when the catalog has no director credit
    #[serde(default)]
    pub director: String,
    #[serde(default)]
    pub vote_average: f64,
}

impl MovieRecord {
    /// Minimal record, mostly useful for building small corpora
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id: MovieId(id),
            title: title.into(),
            original_title: None,
            overview: None,
            release_date: None,
            original_language: None,
            poster_path: None,
            backdrop_path: None,
            genres: Vec::new(),
            cast: Vec::new(),
            director: String::new(),
            vote_average: 0.0,
        }
    }

    pub fn with_genres(mut self, genres: &[&str]) -> Self {
        self.genres = genres.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn with_cast(mut self, cast: &[&str]) -> Self {
        self.cast = cast.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_director(mut self, director: &str) -> Self {
        self.director = director.to_string();
        self
    }

    pub fn with_vote_average(mut self, vote_average: f64) -> Self {
        self.vote_average = vote_average;
        self
    }
}

/// Display metadata of a movie, the descriptive table row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieSummary {
    pub id: MovieId,
    pub title: String,
    pub original_title: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub original_language: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
}

impl From<&MovieRecord> for MovieSummary {
    fn from(movie: &MovieRecord) -> Self {
        Self {
            id: movie.id,
            title: movie.title.clone(),
            original_title: movie.original_title.clone(),
            overview: movie.overview.clone(),
            release_date: movie.release_date.clone(),
            original_language: movie.original_language.clone(),
            poster_path: movie.poster_path.clone(),
            backdrop_path: movie.backdrop_path.clone(),
        }
    }
}
