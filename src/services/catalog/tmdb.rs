/// The Movie Database (TMDB) catalog
///
/// API Flow:
/// 1. Genres: /genre/movie/list → genre id to name mapping (cached for a day)
/// 2. Movies: /discover/movie?page=N → one page of movies, genre ids only
/// 3. Credits: /movie/{id}/credits → cast in billing order and crew jobs (cached for a week)
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{MovieId, TmdbCredits, TmdbDiscoverPage, TmdbGenre, TmdbGenreList, TmdbMovie},
    services::catalog::MovieCatalog,
};
use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

const GENRE_CACHE_TTL: u64 = 86400; // 1 day
const CREDITS_CACHE_TTL: u64 = 604800; // 1 week
const LANGUAGE: &str = "en-US";

#[derive(Clone)]
pub struct TmdbCatalog {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Cache,
}

impl TmdbCatalog {
    pub fn new(cache: Cache, api_key: String, api_url: String, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "TMDB API returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl MovieCatalog for TmdbCatalog {
    async fn discover_page(&self, page: u32) -> AppResult<Option<Vec<TmdbMovie>>> {
        let page_param = page.to_string();
        let response = self
            .http_client
            .get(format!("{}/discover/movie", self.api_url))
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("language", LANGUAGE),
                ("page", page_param.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::warn!(page, status = %status, body = %body, "Discover page request failed");
        }

        let results = discover_results(status, &body)?;
        tracing::info!(
            page,
            results = results.as_ref().map_or(0, Vec::len),
            provider = "tmdb",
            "Discover page fetched"
        );

        Ok(results)
    }

    async fn credits(&self, id: MovieId) -> AppResult<TmdbCredits> {
        let credits: AppResult<CachedCredits> = cached!(
            self.cache,
            CacheKey::Credits(id),
            CREDITS_CACHE_TTL,
            async move {
                let credits: TmdbCredits = self
                    .get_json(&format!("/movie/{}/credits", id), &[])
                    .await?;
                AppResult::Ok(CachedCredits::from(credits))
            }
        );

        Ok(credits?.into())
    }

    async fn genre_names(&self) -> AppResult<HashMap<u32, String>> {
        let genres: AppResult<Vec<TmdbGenre>> = cached!(
            self.cache,
            CacheKey::GenreList(LANGUAGE.to_string()),
            GENRE_CACHE_TTL,
            async move {
                let list: TmdbGenreList = self
                    .get_json("/genre/movie/list", &[("language", LANGUAGE)])
                    .await?;
                list.genres.ok_or_else(|| {
                    AppError::ExternalApi("Key 'genres' not found in the genre response".to_string())
                })
            }
        );

        Ok(genres?.into_iter().map(|genre| (genre.id, genre.name)).collect())
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}

/// Reads the movies of a discover response
///
/// A response without `results` ends the catalog whatever its status; past the
/// last page TMDB answers with an error status and no results.
fn discover_results(status: StatusCode, body: &str) -> AppResult<Option<Vec<TmdbMovie>>> {
    match serde_json::from_str::<TmdbDiscoverPage>(body) {
        Ok(page) => Ok(page.results),
        Err(_) if !status.is_success() => Ok(None),
        Err(e) => Err(AppError::ExternalApi(format!(
            "Malformed TMDB discover page: {}",
            e
        ))),
    }
}

/// Credits reduced to what the corpus keeps, as stored in the cache
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct CachedCredits {
    cast: Vec<String>,
    director: String,
}

impl From<TmdbCredits> for CachedCredits {
    fn from(credits: TmdbCredits) -> Self {
        Self {
            cast: credits.top_cast(),
            director: credits.director(),
        }
    }
}

impl From<CachedCredits> for TmdbCredits {
    fn from(cached: CachedCredits) -> Self {
        use crate::models::{TmdbCastMember, TmdbCrewMember};

        let crew = if cached.director.is_empty() {
            Vec::new()
        } else {
            vec![TmdbCrewMember {
                name: cached.director,
                job: Some("Director".to_string()),
            }]
        };

        TmdbCredits {
            cast: Some(
                cached
                    .cast
                    .into_iter()
                    .map(|name| TmdbCastMember { name })
                    .collect(),
            ),
            crew: Some(crew),
        }
    }
}
