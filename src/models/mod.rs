use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod movie;
pub mod preferences;
pub mod recommendation;

pub use movie::{MovieId, MovieRecord, MovieSummary};
pub use preferences::{PreferenceState, SessionId, DEFAULT_RATING_THRESHOLD};
pub use recommendation::Recommendation;

/// Number of top-billed cast members kept per movie
pub const TOP_CAST: usize = 5;

// ============================================================================
// Chat API Types
// ============================================================================

/// Incoming chat turn
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// Existing session; a new one is started when absent
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub message: String,
}

/// Reply to one chat turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub session_id: SessionId,
    pub reply: String,
    pub preferences: PreferenceState,
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// One page of `/discover/movie`
///
/// A page without `results` marks the end of the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbDiscoverPage {
    #[serde(default)]
    pub results: Option<Vec<TmdbMovie>>,
}

/// Raw movie entry from `/discover/movie`
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
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
    pub genre_ids: Vec<u32>,
    #[serde(default)]
    pub vote_average: f64,
}

/// `/movie/{id}/credits` response; either list may be missing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbCredits {
    #[serde(default)]
    pub cast: Option<Vec<TmdbCastMember>>,
    #[serde(default)]
    pub crew: Option<Vec<TmdbCrewMember>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCastMember {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCrewMember {
    pub name: String,
    #[serde(default)]
    pub job: Option<String>,
}

/// `/genre/movie/list` response
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbGenreList {
    #[serde(default)]
    pub genres: Option<Vec<TmdbGenre>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbGenre {
    pub id: u32,
    pub name: String,
}

impl TmdbCredits {
    /// Names of the top-billed cast, in billing order
    pub fn top_cast(&self) -> Vec<String> {
        self.cast
            .as_deref()
            .unwrap_or_default()
            .iter()
            .take(TOP_CAST)
            .map(|member| member.name.clone())
            .collect()
    }

    /// First crew member credited as director, or an empty string
    pub fn director(&self) -> String {
        self.crew
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|member| member.job.as_deref() == Some("Director"))
            .map(|member| member.name.clone())
            .unwrap_or_default()
    }
}

impl TmdbMovie {
    /// Converts a catalog entry into a record, resolving genre ids to names
    ///
    /// Returns `None` for entries without an id or title. Genre ids missing
    /// from `genre_names` are dropped.
    pub fn into_record(
        self,
        genre_names: &HashMap<u32, String>,
        credits: &TmdbCredits,
    ) -> Option<MovieRecord> {
        let id = self.id?;
        let title = self.title?;

        let genres = self
            .genre_ids
            .iter()
            .filter_map(|genre_id| genre_names.get(genre_id).cloned())
            .collect();

        Some(MovieRecord {
            id: MovieId(id),
            title,
            original_title: self.original_title,
            overview: self.overview,
            release_date: self.release_date,
            original_language: self.original_language,
            poster_path: self.poster_path,
            backdrop_path: self.backdrop_path,
            genres,
            cast: credits.top_cast(),
            director: credits.director(),
            vote_average: self.vote_average,
        })
    }
}

// ============================================================================
// OpenAI Chat Completion Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

impl CompletionMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}
