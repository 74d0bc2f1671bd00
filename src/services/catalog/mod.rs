/// Movie catalog abstraction
///
/// The ingest job pulls the corpus from a paginated catalog, resolves genre ids
/// to names and attaches credits. TMDB is the only implementation; tests use
/// mocks.
use crate::{
    error::AppResult,
    models::{MovieId, MovieRecord, TmdbCredits, TmdbMovie},
};
use std::collections::{HashMap, HashSet};

pub mod tmdb;

pub use tmdb::TmdbCatalog;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MovieCatalog: Send + Sync {
    /// Fetches one page of the catalog
    ///
    /// `None` means the page had no results, which marks the end of the catalog.
    async fn discover_page(&self, page: u32) -> AppResult<Option<Vec<TmdbMovie>>>;

    /// Cast and crew of one movie
    async fn credits(&self, id: MovieId) -> AppResult<TmdbCredits>;

    /// Genre id → genre name mapping
    async fn genre_names(&self) -> AppResult<HashMap<u32, String>>;

    fn name(&self) -> &'static str;
}

/// Downloads up to `pages` catalog pages and converts them to movie records
///
/// Stops early at the first page without results, and at a failing page once
/// the first page has been read; a failing first page is an error. Missing credits or genre
/// names degrade the affected records instead of failing the crawl; entries
/// without id or title and repeated ids are skipped.
pub async fn collect_corpus(catalog: &dyn MovieCatalog, pages: u32) -> AppResult<Vec<MovieRecord>> {
    let genre_names = match catalog.genre_names().await {
        Ok(names) => names,
        Err(e) => {
            tracing::warn!(error = %e, "Genre list unavailable, genres will be empty");
            HashMap::new()
        }
    };

    let mut movies = Vec::new();
    let mut seen = HashSet::new();

    for page in 1..=pages {
        let results = match catalog.discover_page(page).await {
            Ok(Some(results)) => results,
            Ok(None) => {
                tracing::info!(page, "No results found for page, stopping");
                break;
            }
            Err(e) if page > 1 => {
                tracing::warn!(page, error = %e, "Catalog page failed, keeping earlier pages");
                break;
            }
            Err(e) => return Err(e),
        };

        for movie in results {
            let credits = match movie.id {
                Some(id) => catalog.credits(MovieId(id)).await.unwrap_or_else(|e| {
                    tracing::warn!(movie_id = id, error = %e, "Credits unavailable");
                    TmdbCredits::default()
                }),
                None => TmdbCredits::default(),
            };

            match movie.into_record(&genre_names, &credits) {
                Some(record) if seen.insert(record.id) => movies.push(record),
                Some(record) => {
                    tracing::debug!(movie_id = %record.id, "Skipping repeated movie");
                }
                None => tracing::debug!(page, "Skipping catalog entry without id or title"),
            }
        }

        tracing::debug!(page, collected = movies.len(), "Catalog page processed");
    }

    tracing::info!(
        movies = movies.len(),
        provider = catalog.name(),
        "Finished loading movie results"
    );

    Ok(movies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{TmdbCastMember, TmdbCrewMember};
    use mockall::predicate::eq;

    fn tmdb_movie(id: Option<i64>, title: Option<&str>, genre_ids: Vec<u32>) -> TmdbMovie {
        TmdbMovie {
            id,
            title: title.map(str::to_string),
            original_title: None,
            overview: None,
            release_date: None,
            original_language: None,
            poster_path: None,
            backdrop_path: None,
            genre_ids,
            vote_average: 7.0,
        }
    }

    fn credits(cast: &[&str], director: &str) -> TmdbCredits {
        TmdbCredits {
            cast: Some(
                cast.iter()
                    .map(|name| TmdbCastMember {
                        name: name.to_string(),
                    })
                    .collect(),
            ),
            crew: Some(vec![TmdbCrewMember {
                name: director.to_string(),
                job: Some("Director".to_string()),
            }]),
        }
    }

    #[tokio::test]
    async fn test_collect_stops_at_empty_page() {
        let mut catalog = MockMovieCatalog::new();
        catalog
            .expect_genre_names()
            .returning(|| Ok(HashMap::from([(28, "Action".to_string())])));
        catalog
            .expect_discover_page()
            .with(eq(1))
            .returning(|_| Ok(Some(vec![tmdb_movie(Some(1), Some("Heat"), vec![28, 80])])));
        catalog
            .expect_discover_page()
            .with(eq(2))
            .returning(|_| Ok(None));
        catalog
            .expect_credits()
            .returning(|_| Ok(credits(&["Al Pacino"], "Michael Mann")));
        catalog.expect_name().return_const("mock");

        let movies = collect_corpus(&catalog, 10).await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].genres, vec!["Action".to_string()]);
        assert_eq!(movies[0].cast, vec!["Al Pacino".to_string()]);
        assert_eq!(movies[0].director, "Michael Mann");
    }

    #[tokio::test]
    async fn test_collect_tolerates_missing_credits_and_genres() {
        let mut catalog = MockMovieCatalog::new();
        catalog
            .expect_genre_names()
            .returning(|| Err(AppError::ExternalApi("down".to_string())));
        catalog.expect_discover_page().returning(|page| {
            Ok(Some(vec![
                tmdb_movie(Some(i64::from(page)), Some("Heat"), vec![28]),
                tmdb_movie(None, Some("No id"), vec![]),
            ]))
        });
        catalog
            .expect_credits()
            .returning(|_| Err(AppError::ExternalApi("404".to_string())));
        catalog.expect_name().return_const("mock");

        let movies = collect_corpus(&catalog, 2).await.unwrap();
        assert_eq!(movies.len(), 2);
        assert!(movies.iter().all(|m| m.genres.is_empty() && m.cast.is_empty()));
        assert!(movies.iter().all(|m| m.director.is_empty()));
    }

    #[tokio::test]
    async fn test_collect_skips_repeated_ids() {
        let mut catalog = MockMovieCatalog::new();
        catalog.expect_genre_names().returning(|| Ok(HashMap::new()));
        catalog
            .expect_discover_page()
            .returning(|_| Ok(Some(vec![tmdb_movie(Some(7), Some("Se7en"), vec![])])));
        catalog
            .expect_credits()
            .returning(|_| Ok(TmdbCredits::default()));
        catalog.expect_name().return_const("mock");

        let movies = collect_corpus(&catalog, 3).await.unwrap();
        assert_eq!(movies.len(), 1);
    }

    #[tokio::test]
    async fn test_collect_propagates_page_errors() {
        let mut catalog = MockMovieCatalog::new();
        catalog.expect_genre_names().returning(|| Ok(HashMap::new()));
        catalog
            .expect_discover_page()
            .returning(|_| Err(AppError::ExternalApi("401".to_string())));

        assert!(collect_corpus(&catalog, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_collect_keeps_earlier_pages_when_later_page_fails() {
        let mut catalog = MockMovieCatalog::new();
        catalog.expect_genre_names().returning(|| Ok(HashMap::new()));
        catalog
            .expect_discover_page()
            .with(eq(1))
            .returning(|_| Ok(Some(vec![tmdb_movie(Some(1), Some("Heat"), vec![])])));
        catalog
            .expect_discover_page()
            .with(eq(2))
            .times(1)
            .returning(|_| Err(AppError::ExternalApi("TMDB API returned status 422".to_string())));
        catalog
            .expect_credits()
            .returning(|_| Ok(TmdbCredits::default()));
        catalog.expect_name().return_const("mock");

        let movies = collect_corpus(&catalog, 5).await.unwrap();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].title, "Heat");
    }
}
