/// Conversation turns
///
/// A turn folds the message into the session's preferences, persists them and
/// then either answers with recommendations or hands the message to the
/// general-purpose chat model.
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{ChatReply, CompletionMessage, PreferenceState, Recommendation, SessionId},
    services::{
        chat_completion::ChatCompletion, extractor::PreferenceExtractor,
        preference_store::PreferenceStore, recommendations::RecommendationEngine,
    },
};

const RECOMMEND_TRIGGER: &str = "recommend";
const PREFERENCE_TRIGGERS: [&str; 3] = ["genre", "director", "actor"];

pub const RECOMMENDATIONS_PREFIX: &str = "\nHere are some recommendations: ";
pub const NO_MATCH_REPLY: &str = "I couldn't find any movie that matches your preferences. \
You may want to adjust your preferences and try again.";
pub const CHAT_UNAVAILABLE_REPLY: &str =
    "Sorry, I'm having trouble answering right now. Please try again in a moment.";

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// How many titles each recommendation strategy asks for
#[derive(Debug, Clone, Copy)]
pub struct RecommendationCounts {
    pub by_title: usize,
    pub by_preferences: usize,
}

impl Default for RecommendationCounts {
    fn default() -> Self {
        Self {
            by_title: 5,
            by_preferences: 10,
        }
    }
}

type TurnLock = Arc<tokio::sync::Mutex<()>>;

pub struct ChatService {
    extractor: PreferenceExtractor,
    engine: Arc<RecommendationEngine>,
    store: Arc<dyn PreferenceStore>,
    completion: Arc<dyn ChatCompletion>,
    counts: RecommendationCounts,
    store_timeout: Duration,
    turn_locks: Mutex<HashMap<SessionId, TurnLock>>,
}

impl ChatService {
    pub fn new(
        engine: Arc<RecommendationEngine>,
        store: Arc<dyn PreferenceStore>,
        completion: Arc<dyn ChatCompletion>,
        counts: RecommendationCounts,
    ) -> Self {
        Self {
            extractor: PreferenceExtractor::from_schema(engine.tables().schema()),
            engine,
            store,
            completion,
            counts,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Bounds every preference load and save
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    pub fn counts(&self) -> RecommendationCounts {
        self.counts
    }

    /// Stored preferences of `session`, defaults when never saved
    pub async fn preferences(&self, session: SessionId) -> AppResult<PreferenceState> {
        let stored = self
            .bounded("load", self.store.load(session))
            .await?;
        Ok(stored.unwrap_or_default())
    }

    /// Processes one chat turn
    ///
    /// Turns of the same session run one at a time; different sessions proceed
    /// concurrently.
    pub async fn handle_message(&self, session: SessionId, message: &str) -> AppResult<ChatReply> {
        if message.trim().is_empty() {
            return Err(AppError::InvalidInput("Message must not be empty".to_string()));
        }

        let lock = self.turn_lock(session)?;
        let reply = {
            let _turn = lock.lock().await;
            self.run_turn(session, message).await
        };
        self.release_turn_lock(session, lock);

        Ok(reply)
    }

    async fn run_turn(&self, session: SessionId, message: &str) -> ChatReply {
        // an unreadable record is left in place rather than overwritten with defaults
        let (state, persist) = match self.preferences(session).await {
            Ok(state) => (state, true),
            Err(e) => {
                tracing::warn!(
                    session_id = %session,
                    store = self.store.name(),
                    error = %e,
                    "Failed to load preferences, continuing with defaults"
                );
                (PreferenceState::new(), false)
            }
        };
        let preferences = self.extractor.extract(message, state);

        if persist {
            if let Err(e) = self
                .bounded("save", self.store.save(session, &preferences))
                .await
            {
                tracing::error!(
                    session_id = %session,
                    store = self.store.name(),
                    error = %e,
                    "Failed to persist preferences"
                );
            }
        }

        let reply = if message.contains(RECOMMEND_TRIGGER) {
            self.recommend(message, &preferences).await
        } else {
            self.converse(session, message).await
        };

        ChatReply {
            session_id: session,
            reply,
            preferences,
        }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .map_err(|_| {
                AppError::Internal(format!(
                    "Preference {} timed out after {}ms",
                    operation,
                    self.store_timeout.as_millis()
                ))
            })?
    }

    async fn recommend(&self, message: &str, preferences: &PreferenceState) -> String {
        let outcome = if let Some(title) = &preferences.movie {
            Some(
                self.engine
                    .find_similar_movies(title, self.counts.by_title)
                    .await,
            )
        } else if PREFERENCE_TRIGGERS
            .iter()
            .any(|trigger| message.contains(trigger))
        {
            Some(
                self.engine
                    .find_similar_movies_by_preferences(preferences, self.counts.by_preferences)
                    .await,
            )
        } else {
            None
        };

        match outcome.as_ref().and_then(Recommendation::non_empty_titles) {
            Some(titles) => format!("{}{}", RECOMMENDATIONS_PREFIX, titles.join(", ")),
            None => {
                tracing::info!(outcome = ?outcome, "No recommendations for this turn");
                NO_MATCH_REPLY.to_string()
            }
        }
    }

    async fn converse(&self, session: SessionId, message: &str) -> String {
        match self
            .completion
            .complete(vec![CompletionMessage::user(message)])
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    session_id = %session,
                    model = self.completion.name(),
                    error = %e,
                    "Chat completion failed"
                );
                CHAT_UNAVAILABLE_REPLY.to_string()
            }
        }
    }

    fn turn_lock(&self, session: SessionId) -> AppResult<TurnLock> {
        let mut locks = self
            .turn_locks
            .lock()
            .map_err(|_| AppError::Internal("Session lock table poisoned".to_string()))?;
        Ok(locks.entry(session).or_default().clone())
    }

    /// Drops the session's lock entry once no other turn holds or awaits it
    fn release_turn_lock(&self, session: SessionId, lock: TurnLock) {
        let Ok(mut locks) = self.turn_locks.lock() else {
            return;
        };
        // one reference in the table, one held here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&session);
        }
    }

    #[cfg(test)]
    fn tracked_sessions(&self) -> usize {
        self.turn_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
