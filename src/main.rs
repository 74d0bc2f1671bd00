use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use movie_chat_api::{
    config::{Config, VectorBackend},
    db::{create_pool, create_redis_client, run_migrations, Cache, MovieRepository},
    routes::{create_router, AppState},
    services::{
        chat::{ChatService, RecommendationCounts},
        chat_completion::OpenAiChat,
        encoder::MovieTables,
        preference_store::RedisPreferenceStore,
        recommendations::RecommendationEngine,
        vector_index::{
            ensure_matches_schema, upsert_in_batches, InMemoryIndex, PineconeIndex, VectorIndex,
        },
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    let tables = Arc::new(MovieRepository::new(pool).load_tables().await?);

    let index = build_index(&config, &tables).await?;
    let engine = Arc::new(RecommendationEngine::new(
        tables,
        index,
        config.external_timeout(),
    ));

    let redis_client = create_redis_client(&config.redis_url)?;
    let (cache, cache_writer) = Cache::new(redis_client).await;
    let store = Arc::new(RedisPreferenceStore::new(cache));

    let completion = Arc::new(OpenAiChat::new(
        config.openai_api_key.clone(),
        config.openai_api_url.clone(),
        config.openai_model.clone(),
        config.external_timeout(),
    )?);

    let chat = Arc::new(ChatService::new(
        engine,
        store,
        completion,
        RecommendationCounts {
            by_title: config.title_recommendations,
            by_preferences: config.preference_recommendations,
        },
    )
    .with_store_timeout(config.external_timeout()));
    let app = create_router(AppState::new(chat));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache_writer.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

/// Selects the configured index backend
///
/// The in-memory index starts empty, so the corpus vectors are loaded into it
/// before serving. Either way the index must match the loaded schema.
async fn build_index(config: &Config, tables: &MovieTables) -> anyhow::Result<Arc<dyn VectorIndex>> {
    let index: Arc<dyn VectorIndex> = match config.vector_backend {
        VectorBackend::Pinecone => Arc::new(PineconeIndex::new(
            config.pinecone_api_key.clone(),
            config.pinecone_controller_url.clone(),
            config.pinecone_index_url.clone(),
            config.external_timeout(),
        )?),
        VectorBackend::Memory => {
            let index = InMemoryIndex::new(config.pinecone_index.clone());
            let vectors = tables
                .vectors()
                .map(|(id, vector)| (id.to_string(), vector.to_vec()))
                .collect();
            upsert_in_batches(&index, vectors).await?;
            Arc::new(index)
        }
    };

    ensure_matches_schema(index.as_ref(), &config.pinecone_index, tables.schema()).await?;
    tracing::info!(backend = index.name(), "Vector index ready");
    Ok(index)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
