use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{ChatReply, ChatRequest, PreferenceState, SessionId},
    routes::AppState,
};

/// Handler for one chat turn
///
/// Starts a new session when the request carries no session id.
pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<ChatReply>> {
    let session = request.session_id.unwrap_or_default();
    let reply = state.chat.handle_message(session, &request.message).await?;
    Ok(Json(reply))
}

/// Handler for a session's accumulated preferences
pub async fn get_preferences(
    State(state): State<AppState>,
    Path(session): Path<SessionId>,
) -> AppResult<Json<PreferenceState>> {
    Ok(Json(state.chat.preferences(session).await?))
}
