use axum::{extract::State, Json};
use serde::Deserialize;

use crate::{
    models::{PreferenceState, Recommendation},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SimilarRequest {
    pub title: String,
    /// Defaults to the configured by-title count
    pub n: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PreferencesRequest {
    pub preferences: PreferenceState,
    /// Defaults to the configured by-preferences count
    pub n: Option<usize>,
}

/// Handler for movies similar to an exact title
pub async fn similar(
    State(state): State<AppState>,
    Json(request): Json<SimilarRequest>,
) -> Json<Recommendation> {
    let n = request.n.unwrap_or(state.chat.counts().by_title);
    Json(state.chat.engine().find_similar_movies(&request.title, n).await)
}

/// Handler for movies similar to everything matching a preference set
pub async fn by_preferences(
    State(state): State<AppState>,
    Json(request): Json<PreferencesRequest>,
) -> Json<Recommendation> {
    let n = request.n.unwrap_or(state.chat.counts().by_preferences);
    Json(
        state
            .chat
            .engine()
            .find_similar_movies_by_preferences(&request.preferences, n)
            .await,
    )
}
