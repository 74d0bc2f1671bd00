use std::sync::Arc;
use std::time::Duration;

use crate::{
    models::{MovieId, PreferenceState, Recommendation},
    services::{
        encoder::{EncodedMovie, FeatureKind, MovieTables},
        vector_index::{Neighbor, VectorIndex},
    },
};

/// Nearest-neighbor movie recommendations
///
/// Two strategies are offered and the caller picks one: similarity to an exact
/// title, or similarity to every movie matching the accumulated preferences.
/// Index failures never escape: they are logged and produce an empty title
/// list.
pub struct RecommendationEngine {
    tables: Arc<MovieTables>,
    index: Arc<dyn VectorIndex>,
    query_timeout: Duration,
}

impl RecommendationEngine {
    pub fn new(tables: Arc<MovieTables>, index: Arc<dyn VectorIndex>, query_timeout: Duration) -> Self {
        Self {
            tables,
            index,
            query_timeout,
        }
    }

    pub fn tables(&self) -> &MovieTables {
        &self.tables
    }

    /// Recommends movies similar to the movie titled exactly `title`
    ///
    /// A title missing from the catalog is echoed back as `NotFound`.
    pub async fn find_similar_movies(&self, title: &str, n: usize) -> Recommendation {
        let Some(row) = self.tables.row_by_title(title) else {
            tracing::info!(title = %title, "Title not in catalog");
            return Recommendation::NotFound {
                title: title.to_string(),
            };
        };

        let vector = self.tables.encoded()[row].features.clone();
        let results = self.query_or_empty(vec![vector], n).await;
        let neighbors = results.into_iter().next().unwrap_or_default();

        let titles = self.resolve_titles(&neighbors);
        tracing::info!(
            title = %title,
            requested = n,
            returned = titles.len(),
            "Similar movies by title"
        );

        Recommendation::titles(titles)
    }

    /// Recommends movies similar to those matching `preferences`
    ///
    /// Within each of genres, directors and actors a movie must match any
    /// selected value; across fields all non-empty filters must hold. The rating
    /// floor and the exact title (when set) narrow the set further. The index is
    /// only queried when more than `n` movies survive; otherwise the untouched
    /// preferences come back as `InsufficientCandidates`.
    pub async fn find_similar_movies_by_preferences(
        &self,
        preferences: &PreferenceState,
        n: usize,
    ) -> Recommendation {
        let candidates: Vec<&EncodedMovie> = self
            .tables
            .encoded()
            .iter()
            .filter(|row| self.matches_preferences(row, preferences))
            .collect();

        if candidates.len() <= n {
            tracing::info!(
                candidates = candidates.len(),
                requested = n,
                "Too few candidates to query the index"
            );
            return Recommendation::InsufficientCandidates {
                preferences: preferences.clone(),
                candidates: candidates.len(),
            };
        }

        let vectors = candidates
            .iter()
            .map(|row| row.features.clone())
            .collect();
        let results = self.query_or_empty(vectors, n).await;

        let neighbors: Vec<Neighbor> = results.into_iter().flatten().collect();
        let titles = self.resolve_titles(&neighbors);

        tracing::info!(
            candidates = candidates.len(),
            requested = n,
            returned = titles.len(),
            "Similar movies by preferences"
        );

        Recommendation::titles(titles)
    }

    fn matches_preferences(&self, row: &EncodedMovie, preferences: &PreferenceState) -> bool {
        let field_matches = |kind: FeatureKind, selected: &[String]| {
            selected.is_empty()
                || selected
                    .iter()
                    .any(|name| self.tables.has_feature(row, kind, name))
        };

        field_matches(FeatureKind::Genre, &preferences.genres)
            && field_matches(FeatureKind::Director, &preferences.directors)
            && field_matches(FeatureKind::Cast, &preferences.actors)
            && row.vote_average >= preferences.rating_threshold
            && preferences
                .movie
                .as_deref()
                .map_or(true, |title| row.title == title)
    }

    /// Queries the index, degrading every failure to an empty result
    async fn query_or_empty(&self, vectors: Vec<Vec<f32>>, top_k: usize) -> Vec<Vec<Neighbor>> {
        let queries = vectors.len();

        match tokio::time::timeout(self.query_timeout, self.index.query(vectors, top_k)).await {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                tracing::warn!(
                    error = %e,
                    backend = self.index.name(),
                    queries,
                    "Vector index query failed, returning no results"
                );
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    backend = self.index.name(),
                    queries,
                    "Vector index query timed out, returning no results"
                );
                Vec::new()
            }
        }
    }

    /// Maps neighbor ids to titles in rank order, keeping duplicates
    fn resolve_titles(&self, neighbors: &[Neighbor]) -> Vec<String> {
        neighbors
            .iter()
            .filter_map(|neighbor| {
                let title = neighbor
                    .id
                    .parse::<MovieId>()
                    .ok()
                    .and_then(|id| self.tables.title_of(id));
                if title.is_none() {
                    tracing::debug!(id = %neighbor.id, "Index returned an unknown movie id");
                }
                title.map(str::to_string)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::MovieRecord;
    use crate::services::vector_index::MockVectorIndex;

    fn neighbor(id: &str) -> Neighbor {
        Neighbor {
            id: id.to_string(),
            score: 1.0,
        }
    }

    fn corpus() -> Vec<MovieRecord> {
        vec![
            MovieRecord::new(1, "Heat")
                .with_genres(&["Crime", "Action"])
                .with_cast(&["Al Pacino", "Robert De Niro"])
                .with_director("Michael Mann")
                .with_vote_average(8.3),
            MovieRecord::new(2, "Collateral")
                .with_genres(&["Thriller", "Crime"])
                .with_cast(&["Tom Cruise"])
                .with_director("Michael Mann")
                .with_vote_average(7.5),
            MovieRecord::new(3, "Die Hard")
                .with_genres(&["Action"])
                .with_cast(&["Bruce Willis"])
                .with_director("John McTiernan")
                .with_vote_average(7.8),
            MovieRecord::new(4, "Speed")
                .with_genres(&["Action", "Thriller"])
                .with_cast(&["Keanu Reeves"])
                .with_director("Jan de Bont")
                .with_vote_average(6.5),
            MovieRecord::new(5, "Gigli")
                .with_genres(&["Comedy", "Crime"])
                .with_cast(&["Ben Affleck"])
                .with_director("Martin Brest")
                .with_vote_average(2.6),
        ]
    }

    fn engine(index: MockVectorIndex) -> RecommendationEngine {
        RecommendationEngine::new(
            Arc::new(MovieTables::fit(&corpus())),
            Arc::new(index),
            Duration::from_secs(1),
        )
    }

    fn prefs() -> PreferenceState {
        PreferenceState::new()
    }

    #[tokio::test]
    async fn test_unknown_title_is_echoed() {
        let mut index = MockVectorIndex::new();
        index.expect_query().never();

        let result = engine(index).find_similar_movies("Thief", 5).await;
        assert_eq!(
            result,
            Recommendation::NotFound {
                title: "Thief".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_title_lookup_is_exact() {
        let mut index = MockVectorIndex::new();
        index.expect_query().never();

        let result = engine(index).find_similar_movies("heat", 5).await;
        assert!(matches!(result, Recommendation::NotFound { title } if title == "heat"));
    }

    #[tokio::test]
    async fn test_similar_by_title_keeps_rank_order_and_duplicates() {
        let tables = MovieTables::fit(&corpus());
        let heat_vector = tables.encoded()[0].features.clone();

        let mut index = MockVectorIndex::new();
        index
            .expect_query()
            .withf(move |vectors, top_k| *top_k == 5 && vectors.len() == 1 && vectors[0] == heat_vector)
            .times(1)
            .returning(|_, _| {
                Ok(vec![vec![
                    neighbor("2"),
                    neighbor("1"),
                    neighbor("999"),
                    neighbor("2"),
                ]])
            });

        let result = engine(index).find_similar_movies("Heat", 5).await;
        assert_eq!(
            result,
            Recommendation::titles(vec![
                "Collateral".to_string(),
                "Heat".to_string(),
                "Collateral".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn test_index_failure_yields_empty_titles() {
        let mut index = MockVectorIndex::new();
        index
            .expect_query()
            .returning(|_, _| Err(AppError::VectorIndex("503 Service Unavailable".to_string())));
        index.expect_name().return_const("mock");

        let result = engine(index).find_similar_movies("Heat", 5).await;
        assert_eq!(result, Recommendation::titles(vec![]));
    }

    #[tokio::test]
    async fn test_by_preferences_insufficient_candidates_returns_input() {
        let mut index = MockVectorIndex::new();
        index.expect_query().never();

        let mut preferences = prefs();
        preferences.genres.push("Action".to_string());

        // Heat, Die Hard and Speed pass the 0.65 floor: 3 <= 3
        let result = engine(index)
            .find_similar_movies_by_preferences(&preferences, 3)
            .await;
        assert_eq!(
            result,
            Recommendation::InsufficientCandidates {
                preferences,
                candidates: 3
            }
        );
    }

    #[tokio::test]
    async fn test_by_preferences_queries_every_candidate() {
        let mut index = MockVectorIndex::new();
        index
            .expect_query()
            .withf(|vectors, top_k| vectors.len() == 3 && *top_k == 2)
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    vec![neighbor("1"), neighbor("3")],
                    vec![neighbor("3"), neighbor("4")],
                    vec![neighbor("4"), neighbor("1")],
                ])
            });

        let mut preferences = prefs();
        preferences.genres.push("Action".to_string());

        let result = engine(index)
            .find_similar_movies_by_preferences(&preferences, 2)
            .await;
        assert_eq!(
            result,
            Recommendation::titles(
                ["Heat", "Die Hard", "Die Hard", "Speed", "Speed", "Heat"]
                    .iter()
                    .map(|t| t.to_string())
                    .collect()
            )
        );
    }

    #[tokio::test]
    async fn test_by_preferences_or_within_field_and_across_fields() {
        let tables = MovieTables::fit(&corpus());
        let engine = RecommendationEngine::new(
            Arc::new(tables.clone()),
            Arc::new(MockVectorIndex::new()),
            Duration::from_secs(1),
        );

        let mut preferences = prefs();
        preferences.rating_threshold = 0.0;
        preferences.genres = vec!["Comedy".to_string(), "Thriller".to_string()];
        preferences.directors = vec!["Michael Mann".to_string(), "Martin Brest".to_string()];

        let matched: Vec<&str> = tables
            .encoded()
            .iter()
            .filter(|row| engine.matches_preferences(row, &preferences))
            .map(|row| row.title.as_str())
            .collect();
        // Speed is a thriller but not by either director
        assert_eq!(matched, vec!["Collateral", "Gigli"]);

        preferences.actors = vec!["Tom Cruise".to_string()];
        let matched: Vec<&str> = tables
            .encoded()
            .iter()
            .filter(|row| engine.matches_preferences(row, &preferences))
            .map(|row| row.title.as_str())
            .collect();
        assert_eq!(matched, vec!["Collateral"]);
    }

    #[tokio::test]
    async fn test_rating_floor_is_inclusive() {
        let tables = MovieTables::fit(&corpus());
        let engine = RecommendationEngine::new(
            Arc::new(tables.clone()),
            Arc::new(MockVectorIndex::new()),
            Duration::from_secs(1),
        );

        let speed = &tables.encoded()[3];
        let mut preferences = prefs();
        assert!(engine.matches_preferences(speed, &preferences));

        preferences.rating_threshold = 0.66;
        assert!(!engine.matches_preferences(speed, &preferences));
    }

    #[tokio::test]
    async fn test_exact_title_filter_narrows_to_insufficient() {
        let mut index = MockVectorIndex::new();
        index.expect_query().never();

        let mut preferences = prefs();
        preferences.genres.push("Action".to_string());
        preferences.movie = Some("Heat".to_string());

        let result = engine(index)
            .find_similar_movies_by_preferences(&preferences, 1)
            .await;
        assert_eq!(
            result,
            Recommendation::InsufficientCandidates {
                preferences,
                candidates: 1
            }
        );
    }

    /// Index whose queries never finish within the engine's timeout
    struct SlowIndex;

    #[async_trait::async_trait]
    impl VectorIndex for SlowIndex {
        async fn create_index(&self, _spec: &crate::services::vector_index::IndexSpec) -> crate::error::AppResult<()> {
            Ok(())
        }

        async fn delete_index(&self, _name: &str) -> crate::error::AppResult<()> {
            Ok(())
        }

        async fn list_indexes(&self) -> crate::error::AppResult<Vec<String>> {
            Ok(vec![])
        }

        async fn index_dimension(&self, _name: &str) -> crate::error::AppResult<Option<usize>> {
            Ok(None)
        }

        async fn upsert(&self, _vectors: Vec<(String, Vec<f32>)>) -> crate::error::AppResult<()> {
            Ok(())
        }

        async fn query(&self, _vectors: Vec<Vec<f32>>, _top_k: usize) -> crate::error::AppResult<Vec<Vec<Neighbor>>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![vec![neighbor("1")]])
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_by_preferences_index_timeout_yields_empty_titles() {
        let engine = RecommendationEngine::new(
            Arc::new(MovieTables::fit(&corpus())),
            Arc::new(SlowIndex),
            Duration::from_millis(20),
        );

        let mut preferences = prefs();
        preferences.rating_threshold = 0.0;
        let result = engine.find_similar_movies_by_preferences(&preferences, 1).await;
        assert_eq!(result, Recommendation::titles(vec![]));
    }
}
