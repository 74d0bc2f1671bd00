/// Durable per-session preference records
///
/// Each session owns exactly one record, overwritten wholesale after every
/// update so that a restarted process resumes where the session left off.
use std::collections::HashMap;
use std::sync::RwLock;

use crate::{
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{PreferenceState, SessionId},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Returns the stored state, or `None` for a session never saved
    async fn load(&self, session: SessionId) -> AppResult<Option<PreferenceState>>;

    /// Replaces the stored state of `session`
    async fn save(&self, session: SessionId, state: &PreferenceState) -> AppResult<()>;

    fn name(&self) -> &'static str;
}

/// Preferences stored as JSON documents in Redis, without expiry
#[derive(Clone)]
pub struct RedisPreferenceStore {
    cache: Cache,
}

impl RedisPreferenceStore {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

#[async_trait::async_trait]
impl PreferenceStore for RedisPreferenceStore {
    async fn load(&self, session: SessionId) -> AppResult<Option<PreferenceState>> {
        self.cache
            .get_from_cache(&CacheKey::Preferences(session))
            .await
    }

    async fn save(&self, session: SessionId, state: &PreferenceState) -> AppResult<()> {
        self.cache
            .set_durable(&CacheKey::Preferences(session), state)
            .await?;
        tracing::debug!(session_id = %session, "Saved preferences");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Process-local store; state is lost on restart
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    records: RwLock<HashMap<SessionId, PreferenceState>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn load(&self, session: SessionId) -> AppResult<Option<PreferenceState>> {
        let records = self
            .records
            .read()
            .map_err(|_| AppError::Internal("Preference store lock poisoned".to_string()))?;
        Ok(records.get(&session).cloned())
    }

    async fn save(&self, session: SessionId, state: &PreferenceState) -> AppResult<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| AppError::Internal("Preference store lock poisoned".to_string()))?;
        records.insert(session, state.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_unknown_session() {
        let store = MemoryPreferenceStore::new();
        assert_eq!(store.load(SessionId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_overwrites_record() {
        let store = MemoryPreferenceStore::new();
        let session = SessionId::new();

        let mut state = PreferenceState::new();
        state.genres.push("Horror".to_string());
        store.save(session, &state).await.unwrap();

        state.movie = Some("Alien".to_string());
        store.save(session, &state).await.unwrap();

        assert_eq!(store.load(session).await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_memory_store_isolates_sessions() {
        let store = MemoryPreferenceStore::new();
        let first = SessionId::new();
        let second = SessionId::new();

        let mut state = PreferenceState::new();
        state.actors.push("Jack Nicholson".to_string());
        store.save(first, &state).await.unwrap();

        assert_eq!(store.load(second).await.unwrap(), None);
    }
}
