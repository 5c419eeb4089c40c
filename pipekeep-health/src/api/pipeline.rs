//! Pipeline endpoints: dashboard view, reconciliation and operator batches

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiError;
use crate::batch::BatchOutcome;
use crate::evictor::evict;
use crate::pipeline::{load_pipeline, PipelineView};
use crate::reconciler::{reconcile, ReconcileReport};
use crate::warnings::issue_warnings;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PipelineQuery {
    /// Restrict the view to one owner
    pub owner: Option<String>,
}

/// Lead ids selected by an operator
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    #[serde(flatten)]
    pub outcome: BatchOutcome,
    pub message: String,
}

impl From<BatchOutcome> for BatchResponse {
    fn from(outcome: BatchOutcome) -> Self {
        Self {
            message: outcome.message(),
            outcome,
        }
    }
}

/// GET /api/pipeline
pub async fn get_pipeline(
    State(state): State<AppState>,
    query: Result<Query<PipelineQuery>, QueryRejection>,
) -> Result<Json<PipelineView>, ApiError> {
    let Query(query) = query?;
    let owner = query.owner.as_deref().filter(|o| !o.trim().is_empty());
    let view = load_pipeline(&state.ctx, owner).await?;
    Ok(Json(view))
}

/// POST /api/pipeline/reconcile
pub async fn post_reconcile(
    State(state): State<AppState>,
) -> Result<Json<ReconcileReport>, ApiError> {
    Ok(Json(reconcile(&state.ctx).await?))
}

/// POST /api/pipeline/warn
pub async fn post_warn(
    State(state): State<AppState>,
    request: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(request) = request?;
    let outcome = issue_warnings(&state.ctx, &request.ids).await?;
    Ok(Json(outcome.into()))
}

/// POST /api/pipeline/evict
pub async fn post_evict(
    State(state): State<AppState>,
    request: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(request) = request?;
    let outcome = evict(&state.ctx, &request.ids).await?;
    Ok(Json(outcome.into()))
}
