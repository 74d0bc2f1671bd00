use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{MovieId, MovieRecord},
    services::encoder::{FeatureColumn, FeatureSchema, MovieTables},
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the bundled migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, FromRow)]
struct MovieRow {
    id: i64,
    title: String,
    original_title: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    original_language: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    genres: Vec<String>,
    cast_members: Vec<String>,
    director: String,
    vote_average: f64,
}

impl From<MovieRow> for MovieRecord {
    fn from(row: MovieRow) -> Self {
        Self {
            id: MovieId(row.id),
            title: row.title,
            original_title: row.original_title,
            overview: row.overview,
            release_date: row.release_date,
            original_language: row.original_language,
            poster_path: row.poster_path,
            backdrop_path: row.backdrop_path,
            genres: row.genres,
            cast: row.cast_members,
            director: row.director,
            vote_average: row.vote_average,
        }
    }
}

#[derive(Debug, FromRow)]
struct SchemaRow {
    fit_id: Uuid,
    fitted_at: DateTime<Utc>,
    corpus: Vec<i64>,
}

#[derive(Debug, FromRow)]
struct ColumnRow {
    kind: String,
    name: String,
}

/// Durable storage of the movie corpus and its fitted feature schemas
///
/// Movies are keyed by catalog id. Every fit appends a new schema; the most
/// recent one is authoritative and records the corpus order it was fitted on.
#[derive(Clone)]
pub struct MovieRepository {
    pool: PgPool,
}

impl MovieRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces movies by id
    pub async fn upsert_movies(&self, movies: &[MovieRecord]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        for movie in movies {
            sqlx::query(
                r#"
                INSERT INTO movies (
                    id, title, original_title, overview, release_date, original_language,
                    poster_path, backdrop_path, genres, cast_members, director, vote_average
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (id) DO UPDATE SET
                    title = EXCLUDED.title,
                    original_title = EXCLUDED.original_title,
                    overview = EXCLUDED.overview,
                    release_date = EXCLUDED.release_date,
                    original_language = EXCLUDED.original_language,
                    poster_path = EXCLUDED.poster_path,
                    backdrop_path = EXCLUDED.backdrop_path,
                    genres = EXCLUDED.genres,
                    cast_members = EXCLUDED.cast_members,
                    director = EXCLUDED.director,
                    vote_average = EXCLUDED.vote_average
                "#,
            )
            .bind(movie.id.0)
            .bind(&movie.title)
            .bind(&movie.original_title)
            .bind(&movie.overview)
            .bind(&movie.release_date)
            .bind(&movie.original_language)
            .bind(&movie.poster_path)
            .bind(&movie.backdrop_path)
            .bind(&movie.genres)
            .bind(&movie.cast)
            .bind(&movie.director)
            .bind(movie.vote_average)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(count = movies.len(), "Persisted movies");
        Ok(())
    }

    /// Stores a fitted schema with its column ordering
    pub async fn save_schema(&self, schema: &FeatureSchema) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let corpus: Vec<i64> = schema.corpus().iter().map(|id| id.0).collect();

        sqlx::query(
            "INSERT INTO feature_schemas (fit_id, fitted_at, dimension, corpus) VALUES ($1, $2, $3, $4)",
        )
        .bind(schema.fit_id())
        .bind(schema.fitted_at())
        .bind(schema.dimension() as i32)
        .bind(&corpus)
        .execute(&mut *tx)
        .await?;

        for (position, column) in schema.columns().iter().enumerate() {
            sqlx::query(
                "INSERT INTO feature_columns (fit_id, position, kind, name) VALUES ($1, $2, $3, $4)",
            )
            .bind(schema.fit_id())
            .bind(position as i32)
            .bind(column.kind.as_str())
            .bind(&column.name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(
            fit_id = %schema.fit_id(),
            dimension = schema.dimension(),
            "Persisted feature schema"
        );
        Ok(())
    }

    /// Loads the latest schema and encodes the corpus it was fitted on
    ///
    /// Fails when no schema exists or when the stored movies no longer match
    /// the schema's corpus; both require running the ingest job again.
    pub async fn load_tables(&self) -> AppResult<MovieTables> {
        let schema = self.latest_schema().await?;

        let rows: Vec<MovieRow> = sqlx::query_as(
            r#"
            SELECT id, title, original_title, overview, release_date, original_language,
                   poster_path, backdrop_path, genres, cast_members, director, vote_average
            FROM movies
            WHERE id = ANY($1)
            "#,
        )
        .bind(schema.corpus().iter().map(|id| id.0).collect::<Vec<i64>>())
        .fetch_all(&self.pool)
        .await?;

        // restore corpus order, which the query does not preserve
        let mut by_id: std::collections::HashMap<MovieId, MovieRecord> = rows
            .into_iter()
            .map(|row| {
                let movie = MovieRecord::from(row);
                (movie.id, movie)
            })
            .collect();
        let movies: Vec<MovieRecord> = schema
            .corpus()
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect();

        let tables = MovieTables::with_schema(schema, &movies)?;
        tracing::info!(
            movies = tables.len(),
            fit_id = %tables.schema().fit_id(),
            "Loaded movie tables"
        );
        Ok(tables)
    }

    async fn latest_schema(&self) -> AppResult<FeatureSchema> {
        let schema: SchemaRow = sqlx::query_as(
            "SELECT fit_id, fitted_at, corpus FROM feature_schemas ORDER BY fitted_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            AppError::Schema("No feature schema found; run the ingest job first".to_string())
        })?;

        let columns: Vec<ColumnRow> = sqlx::query_as(
            "SELECT kind, name FROM feature_columns WHERE fit_id = $1 ORDER BY position",
        )
        .bind(schema.fit_id)
        .fetch_all(&self.pool)
        .await?;

        let columns = columns
            .into_iter()
            .map(|row| {
                Ok(FeatureColumn {
                    kind: row.kind.parse()?,
                    name: row.name,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        FeatureSchema::from_parts(
            schema.fit_id,
            schema.fitted_at,
            columns,
            schema.corpus.into_iter().map(MovieId).collect(),
        )
    }
}
