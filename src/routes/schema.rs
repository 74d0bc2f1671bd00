use std::collections::BTreeMap;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{routes::AppState, services::encoder::FeatureKind};

/// Summary of the feature schema the service is running on
#[derive(Debug, Serialize)]
pub struct SchemaSummary {
    pub fit_id: Uuid,
    pub fitted_at: DateTime<Utc>,
    pub dimension: usize,
    pub movies: usize,
    /// Column count per feature kind
    pub vocabulary: BTreeMap<&'static str, usize>,
}

/// Handler describing the active feature schema
pub async fn describe(State(state): State<AppState>) -> Json<SchemaSummary> {
    let tables = state.chat.engine().tables();
    let schema = tables.schema();

    let vocabulary = [
        FeatureKind::Genre,
        FeatureKind::Cast,
        FeatureKind::Director,
        FeatureKind::Title,
        FeatureKind::Rating,
    ]
    .into_iter()
    .map(|kind| (kind.as_str(), schema.vocabulary(kind).count()))
    .collect();

    Json(SchemaSummary {
        fit_id: schema.fit_id(),
        fitted_at: schema.fitted_at(),
        dimension: schema.dimension(),
        movies: tables.len(),
        vocabulary,
    })
}
