/// Pinecone REST index
///
/// Index management goes through the controller (`/databases`); upserts and
/// queries go to the index's own data plane URL. Both are authenticated with
/// the `Api-Key` header.
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    services::vector_index::{join_in_order, IndexSpec, Neighbor, VectorIndex},
};

const API_KEY_HEADER: &str = "Api-Key";

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct DescribeResponse {
    database: DescribedIndex,
}

#[derive(Debug, Deserialize)]
struct DescribedIndex {
    dimension: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<Neighbor>,
}

#[derive(Clone)]
pub struct PineconeIndex {
    http_client: HttpClient,
    api_key: String,
    controller_url: String,
    index_url: String,
}

impl PineconeIndex {
    pub fn new(
        api_key: String,
        controller_url: String,
        index_url: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key,
            controller_url: controller_url.trim_end_matches('/').to_string(),
            index_url: index_url.trim_end_matches('/').to_string(),
        })
    }

    /// Top-k neighbors of a single vector; Pinecone takes one vector per query
    async fn query_one(&self, vector: &[f32], top_k: usize) -> AppResult<Vec<Neighbor>> {
        let request = QueryRequest {
            vector,
            top_k,
            include_values: false,
        };

        let response = self
            .http_client
            .post(format!("{}/query", self.index_url))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?;

        let body: QueryResponse = Self::check_status(response).await?.json().await?;
        Ok(body.matches)
    }

    async fn check_status(response: reqwest::Response) -> AppResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::VectorIndex(format!(
            "Pinecone returned status {}: {}",
            status, body
        )))
    }
}

#[async_trait::async_trait]
impl VectorIndex for PineconeIndex {
    async fn create_index(&self, spec: &IndexSpec) -> AppResult<()> {
        let response = self
            .http_client
            .post(format!("{}/databases", self.controller_url))
            .header(API_KEY_HEADER, &self.api_key)
            .json(spec)
            .send()
            .await?;
        Self::check_status(response).await?;

        tracing::info!(
            index = %spec.name,
            dimension = spec.dimension,
            metric = ?spec.metric,
            shards = spec.shards,
            "Created Pinecone index"
        );
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> AppResult<()> {
        let response = self
            .http_client
            .delete(format!("{}/databases/{}", self.controller_url, name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        Self::check_status(response).await?;

        tracing::info!(index = %name, "Deleted Pinecone index");
        Ok(())
    }

    async fn list_indexes(&self) -> AppResult<Vec<String>> {
        let response = self
            .http_client
            .get(format!("{}/databases", self.controller_url))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let names: Vec<String> = Self::check_status(response).await?.json().await?;
        Ok(names)
    }

    async fn index_dimension(&self, name: &str) -> AppResult<Option<usize>> {
        let response = self
            .http_client
            .get(format!("{}/databases/{}", self.controller_url, name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let described: DescribeResponse = Self::check_status(response).await?.json().await?;
        Ok(Some(described.database.dimension))
    }

    async fn upsert(&self, vectors: Vec<(String, Vec<f32>)>) -> AppResult<()> {
        let request = UpsertRequest {
            vectors: vectors
                .iter()
                .map(|(id, values)| UpsertVector { id, values })
                .collect(),
        };

        let response = self
            .http_client
            .post(format!("{}/vectors/upsert", self.index_url))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?;
        Self::check_status(response).await?;

        tracing::debug!(count = vectors.len(), "Upserted batch into Pinecone");
        Ok(())
    }

    async fn query(&self, vectors: Vec<Vec<f32>>, top_k: usize) -> AppResult<Vec<Vec<Neighbor>>> {
        let queries = vectors.len();
        let requests: Vec<_> = vectors
            .into_iter()
            .map(|vector| {
                let index = self.clone();
                async move { index.query_one(&vector, top_k).await }
            })
            .collect();

        let results = join_in_order(requests).await?;

        tracing::debug!(queries, top_k, "Pinecone query completed");
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "pinecone"
    }
}
