use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// Rating floor applied when the user has not asked for one
pub const DEFAULT_RATING_THRESHOLD: f64 = 0.65;

/// Identifies one chat session and its persisted preference record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Constraints accumulated over a chat session
///
/// The list fields only ever grow: repeated mentions are appended again, so a
/// genre named in two turns shows up twice. `movie` is overwritten by the most
/// recent mention instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreferenceState {
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub directors: Vec<String>,
    #[serde(default)]
    pub actors: Vec<String>,
    /// Minimum normalized rating, usually in [0, 1] but not clamped
    #[serde(default = "default_rating_threshold")]
    pub rating_threshold: f64,
    /// Last exact title the user mentioned
    #[serde(default)]
    pub movie: Option<String>,
}

fn default_rating_threshold() -> f64 {
    DEFAULT_RATING_THRESHOLD
}

impl Default for PreferenceState {
    fn default() -> Self {
        Self::new()
    }
}

impl PreferenceState {
    /// Fresh session state
    pub fn new() -> Self {
        Self {
            genres: Vec::new(),
            directors: Vec::new(),
            actors: Vec::new(),
            rating_threshold: DEFAULT_RATING_THRESHOLD,
            movie: None,
        }
    }

    /// True when none of the categorical fields constrains the search
    pub fn has_no_attributes(&self) -> bool {
        self.genres.is_empty() && self.directors.is_empty() && self.actors.is_empty()
    }
}
