/// In-process vector index
///
/// Exact brute-force cosine search over every stored vector. Suitable for
/// corpora of a few thousand movies and for running without a Pinecone
/// account.
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    services::vector_index::{DistanceMetric, IndexSpec, Neighbor, VectorIndex},
};

#[derive(Debug, Default)]
struct IndexState {
    exists: bool,
    dimension: Option<usize>,
    vectors: BTreeMap<String, Vec<f32>>,
}

#[derive(Debug)]
pub struct InMemoryIndex {
    name: String,
    state: RwLock<IndexState>,
}

/// Cosine similarity; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0_f32, 0.0_f32, 0.0_f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

impl InMemoryIndex {
    /// Creates an existing, empty index that accepts any dimension on first upsert
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(IndexState {
                exists: true,
                ..IndexState::default()
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.read().map(|state| state.vectors.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> AppResult<std::sync::RwLockReadGuard<'_, IndexState>> {
        self.state
            .read()
            .map_err(|_| AppError::Internal("In-memory index lock poisoned".to_string()))
    }

    fn write(&self) -> AppResult<std::sync::RwLockWriteGuard<'_, IndexState>> {
        self.state
            .write()
            .map_err(|_| AppError::Internal("In-memory index lock poisoned".to_string()))
    }

    fn check_name(&self, name: &str) -> AppResult<()> {
        if name != self.name {
            return Err(AppError::VectorIndex(format!(
                "In-memory index '{}' cannot manage index '{}'",
                self.name, name
            )));
        }
        Ok(())
    }

    fn rank(state: &IndexState, query: &[f32], top_k: usize) -> Vec<Neighbor> {
        let mut scored: Vec<Neighbor> = state
            .vectors
            .iter()
            .map(|(id, vector)| Neighbor {
                id: id.clone(),
                score: cosine_similarity(query, vector),
            })
            .collect();

        // best score first; ties broken by id so results are deterministic
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        scored
    }
}

#[async_trait::async_trait]
impl VectorIndex for InMemoryIndex {
    async fn create_index(&self, spec: &IndexSpec) -> AppResult<()> {
        self.check_name(&spec.name)?;
        if spec.metric != DistanceMetric::Cosine {
            return Err(AppError::VectorIndex(format!(
                "In-memory index only supports cosine, got {:?}",
                spec.metric
            )));
        }

        let mut state = self.write()?;
        if state.exists && state.dimension.is_some() {
            return Err(AppError::VectorIndex(format!(
                "Index '{}' already exists",
                spec.name
            )));
        }
        *state = IndexState {
            exists: true,
            dimension: Some(spec.dimension),
            vectors: BTreeMap::new(),
        };
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> AppResult<()> {
        self.check_name(name)?;
        *self.write()? = IndexState::default();
        Ok(())
    }

    async fn list_indexes(&self) -> AppResult<Vec<String>> {
        let state = self.read()?;
        Ok(if state.exists {
            vec![self.name.clone()]
        } else {
            Vec::new()
        })
    }

    async fn index_dimension(&self, name: &str) -> AppResult<Option<usize>> {
        self.check_name(name)?;
        let state = self.read()?;
        Ok(state.exists.then_some(state.dimension).flatten())
    }

    async fn upsert(&self, vectors: Vec<(String, Vec<f32>)>) -> AppResult<()> {
        let mut state = self.write()?;
        if !state.exists {
            return Err(AppError::VectorIndex(format!(
                "Index '{}' does not exist",
                self.name
            )));
        }

        for (id, vector) in vectors {
            let dimension = *state.dimension.get_or_insert(vector.len());
            if vector.len() != dimension {
                return Err(AppError::VectorIndex(format!(
                    "Vector '{}' has {} dimensions, index expects {}",
                    id,
                    vector.len(),
                    dimension
                )));
            }
            state.vectors.insert(id, vector);
        }
        Ok(())
    }

    async fn query(&self, vectors: Vec<Vec<f32>>, top_k: usize) -> AppResult<Vec<Vec<Neighbor>>> {
        let state = self.read()?;
        if !state.exists {
            return Err(AppError::VectorIndex(format!(
                "Index '{}' does not exist",
                self.name
            )));
        }

        Ok(vectors
            .iter()
            .map(|query| Self::rank(&state, query, top_k))
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
