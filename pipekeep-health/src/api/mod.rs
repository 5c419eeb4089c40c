//! HTTP API handlers for pipekeep-health

pub mod buildinfo;
pub mod health;
pub mod pipeline;
pub mod ratio;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pipekeep_common::Error;
use serde_json::json;

pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use pipeline::{get_pipeline, post_evict, post_reconcile, post_warn};
pub use ratio::get_ratio;

/// Any handler failure, rendered as `{ "error": ... }`
#[derive(Debug)]
pub enum ApiError {
    /// Error raised by the engine
    Engine(Error),
    /// Request body or query string could not be extracted
    Rejected { status: StatusCode, message: String },
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Engine(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Engine(err) => {
                let status = match &err {
                    Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    Error::NotFound(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!("Request failed: {}", err);
                }
                (status, err.to_string())
            }
            ApiError::Rejected { status, message } => (status, message),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
