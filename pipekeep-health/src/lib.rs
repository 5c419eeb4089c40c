//! pipekeep-health library - Pipeline health engine
//!
//! Classifies owned leads by staleness, issues warnings, reclaims leads whose
//! warning went unanswered and reports per-owner stock/sales ratios.

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod batch;
pub mod classifier;
pub mod context;
pub mod evictor;
pub mod pipeline;
pub mod providers;
pub mod ratio;
pub mod reconciler;
pub mod store;
pub mod warnings;

pub use batch::{BatchKind, BatchOutcome};
pub use classifier::{classify, Classification, Signals};
pub use context::PipelineContext;
pub use evictor::evict;
pub use pipeline::{load_pipeline, PipelineView};
pub use ratio::{ownership_report, OwnershipReport, ReportPeriod};
pub use reconciler::{reconcile, ReconcileReport};
pub use warnings::issue_warnings;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub ctx: PipelineContext,
}

impl AppState {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let pipeline = Router::new()
        .route("/api/pipeline", get(api::get_pipeline))
        .route("/api/pipeline/reconcile", post(api::post_reconcile))
        .route("/api/pipeline/warn", post(api::post_warn))
        .route("/api/pipeline/evict", post(api::post_evict))
        .route("/api/ratio", get(api::get_ratio));

    Router::new()
        .merge(pipeline)
        .merge(api::health_routes())
        .route("/api/buildinfo", get(api::get_build_info))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
