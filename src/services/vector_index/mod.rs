/// Nearest-neighbor index abstraction
///
/// The retrieval engine only needs upsert and cosine top-k queries; index
/// provisioning (create/delete/list) is used by the ingest job. Implementations
/// talk to a remote Pinecone-compatible service or keep everything in process.
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::task::JoinSet;

use crate::{
    error::{AppError, AppResult},
    services::encoder::FeatureSchema,
};

pub mod memory;
pub mod pinecone;

pub use memory::InMemoryIndex;
pub use pinecone::PineconeIndex;

/// Upserts are sent in chunks of this many vectors
pub const UPSERT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    Dotproduct,
}

/// Parameters for provisioning an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub shards: u32,
}

/// A ranked query hit
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Neighbor {
    pub id: String,
    #[serde(default)]
    pub score: f32,
}

/// Trait for vector index services
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates an index with the given dimensionality and metric
    async fn create_index(&self, spec: &IndexSpec) -> AppResult<()>;

    async fn delete_index(&self, name: &str) -> AppResult<()>;

    async fn list_indexes(&self) -> AppResult<Vec<String>>;

    /// Dimensionality of the named index, `None` when it does not exist
    async fn index_dimension(&self, name: &str) -> AppResult<Option<usize>>;

    /// Inserts or overwrites vectors by id
    ///
    /// Re-upserting an id replaces its vector, so repeating an upsert is a no-op.
    async fn upsert(&self, vectors: Vec<(String, Vec<f32>)>) -> AppResult<()>;

    /// Returns up to `top_k` neighbors per query vector, best first
    ///
    /// The outer vector has one entry per query vector, in query order.
    async fn query(&self, vectors: Vec<Vec<f32>>, top_k: usize) -> AppResult<Vec<Vec<Neighbor>>>;

    /// Index backend name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Fails unless index `name` exists and holds vectors of the schema's dimension
pub async fn ensure_matches_schema(
    index: &dyn VectorIndex,
    name: &str,
    schema: &FeatureSchema,
) -> AppResult<()> {
    let dimension = index.index_dimension(name).await?.ok_or_else(|| {
        AppError::VectorIndex(format!(
            "Index '{}' does not exist; run the ingest job first",
            name
        ))
    })?;
    schema.check_dimension(dimension)
}

/// Runs `queries` concurrently, returning their outputs in input order
///
/// The first failure is returned and the queries still running are aborted.
pub async fn join_in_order<T, F>(queries: Vec<F>) -> AppResult<Vec<T>>
where
    T: Send + 'static,
    F: Future<Output = AppResult<T>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for (position, query) in queries.into_iter().enumerate() {
        tasks.spawn(async move { (position, query.await) });
    }

    let mut outputs: Vec<Option<T>> = (0..tasks.len()).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (position, output) =
            joined.map_err(|e| AppError::Internal(format!("Index query task failed: {}", e)))?;
        outputs[position] = Some(output?);
    }

    Ok(outputs.into_iter().flatten().collect())
}

/// Upserts `vectors` in chunks of [`UPSERT_BATCH_SIZE`]
pub async fn upsert_in_batches(
    index: &dyn VectorIndex,
    vectors: Vec<(String, Vec<f32>)>,
) -> AppResult<usize> {
    let total = vectors.len();
    let mut remaining = vectors.into_iter().peekable();
    let mut batches = 0;

    while remaining.peek().is_some() {
        let batch: Vec<_> = remaining.by_ref().take(UPSERT_BATCH_SIZE).collect();
        index.upsert(batch).await?;
        batches += 1;
    }

    tracing::info!(
        vectors = total,
        batches,
        backend = index.name(),
        "Upserted vectors"
    );

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_in_batches_chunks_by_hundred() {
        let mut index = MockVectorIndex::new();
        index
            .expect_upsert()
            .withf(|batch| batch.len() == UPSERT_BATCH_SIZE)
            .times(2)
            .returning(|_| Ok(()));
        index
            .expect_upsert()
            .withf(|batch| batch.len() == 50)
            .times(1)
            .returning(|_| Ok(()));
        index.expect_name().return_const("mock");

        let vectors = (0..250)
            .map(|i| (i.to_string(), vec![1.0, 0.0]))
            .collect();

        let upserted = upsert_in_batches(&index, vectors).await.unwrap();
        assert_eq!(upserted, 250);
    }

    #[tokio::test]
    async fn test_upsert_in_batches_stops_on_error() {
        let mut index = MockVectorIndex::new();
        index.expect_upsert().times(1).returning(|_| {
            Err(AppError::VectorIndex(
                "service unavailable".to_string(),
            ))
        });

        let vectors = (0..150).map(|i| (i.to_string(), vec![1.0])).collect();
        assert!(upsert_in_batches(&index, vectors).await.is_err());
    }

    #[tokio::test]
    async fn test_join_in_order_runs_concurrently_and_keeps_order() {
        let queries: Vec<_> = [150_u64, 100, 50]
            .into_iter()
            .map(|delay| async move {
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                AppResult::Ok(delay)
            })
            .collect();

        let started = std::time::Instant::now();
        let outputs = join_in_order(queries).await.unwrap();
        assert_eq!(outputs, vec![150, 100, 50]);
        assert!(started.elapsed() < std::time::Duration::from_millis(290));
    }

    #[tokio::test]
    async fn test_join_in_order_returns_first_failure() {
        let queries: Vec<_> = (0..3_u32)
            .map(|i| async move {
                if i == 1 {
                    Err(AppError::VectorIndex("503".to_string()))
                } else {
                    Ok(i)
                }
            })
            .collect();

        assert!(matches!(
            join_in_order(queries).await,
            Err(AppError::VectorIndex(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_matches_schema() {
        let schema = FeatureSchema::fit(&[crate::models::MovieRecord::new(1, "Heat")
            .with_genres(&["Crime"])]);
        let expected = schema.dimension();

        let mut index = MockVectorIndex::new();
        index
            .expect_index_dimension()
            .with(mockall::predicate::eq("movie"))
            .returning(move |_| Ok(Some(expected)));
        assert!(ensure_matches_schema(&index, "movie", &schema).await.is_ok());

        let mut stale = MockVectorIndex::new();
        stale
            .expect_index_dimension()
            .returning(move |_| Ok(Some(expected + 3)));
        assert!(matches!(
            ensure_matches_schema(&stale, "movie", &schema).await,
            Err(AppError::Schema(_))
        ));

        let mut missing = MockVectorIndex::new();
        missing.expect_index_dimension().returning(|_| Ok(None));
        assert!(matches!(
            ensure_matches_schema(&missing, "movie", &schema).await,
            Err(AppError::VectorIndex(_))
        ));
    }

    #[test]
    fn test_index_spec_serialization() {
        let spec = IndexSpec {
            name: "movie".to_string(),
            dimension: 42,
            metric: DistanceMetric::Cosine,
            shards: 1,
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["metric"], "cosine");
        assert_eq!(json["dimension"], 42);
    }
}
