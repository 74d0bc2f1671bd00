/// Rebuilds the movie corpus, its feature schema and the vector index
///
/// Run after changing `TMDB_PAGES` or whenever the catalog should be refreshed;
/// the API server serves the most recent fit on its next start.
use anyhow::Context;
use tracing_subscriber::EnvFilter;

use movie_chat_api::{
    config::Config,
    db::{create_pool, create_redis_client, run_migrations, Cache, MovieRepository},
    services::{
        catalog::{collect_corpus, TmdbCatalog},
        encoder::MovieTables,
        vector_index::{upsert_in_batches, DistanceMetric, IndexSpec, PineconeIndex, VectorIndex},
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = Cache::new(redis_client).await;
    let catalog = TmdbCatalog::new(
        cache,
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
        config.external_timeout(),
    )?;

    let movies = collect_corpus(&catalog, config.tmdb_pages).await?;
    anyhow::ensure!(!movies.is_empty(), "The catalog returned no movies");

    let tables = MovieTables::fit(&movies);
    tracing::info!(
        movies = tables.len(),
        dimension = tables.schema().dimension(),
        fit_id = %tables.schema().fit_id(),
        "Fitted feature schema"
    );

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    let repository = MovieRepository::new(pool);
    repository.upsert_movies(&movies).await?;
    repository.save_schema(tables.schema()).await?;

    let index = PineconeIndex::new(
        config.pinecone_api_key.clone(),
        config.pinecone_controller_url.clone(),
        config.pinecone_index_url.clone(),
        config.external_timeout(),
    )?;
    rebuild_index(&index, &config, &tables).await?;

    cache_writer.shutdown().await;
    tracing::info!("Ingest finished");
    Ok(())
}

/// Drops any previous index and loads every corpus vector into a fresh one
async fn rebuild_index(
    index: &dyn VectorIndex,
    config: &Config,
    tables: &MovieTables,
) -> anyhow::Result<()> {
    let existing = index.list_indexes().await?;
    if existing.contains(&config.pinecone_index) {
        tracing::info!(index = %config.pinecone_index, "Deleting existing index");
        index.delete_index(&config.pinecone_index).await?;
    }

    let spec = IndexSpec {
        name: config.pinecone_index.clone(),
        dimension: tables.schema().dimension(),
        metric: DistanceMetric::Cosine,
        shards: config.pinecone_shards,
    };
    index.create_index(&spec).await?;
    tracing::info!(index = %spec.name, dimension = spec.dimension, "Created index");

    let vectors = tables
        .vectors()
        .map(|(id, vector)| (id.to_string(), vector.to_vec()))
        .collect();
    upsert_in_batches(index, vectors).await?;
    Ok(())
}
