use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::ScoreError, inference::Predictor, labels::LabelMap};

pub mod handlers;
pub mod input;
pub mod page;

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<dyn Predictor>,
    pub labels: Arc<LabelMap>,
    pub device: &'static str,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/score", post(handlers::score_form))
        .route("/api/score", post(handlers::score_json))
        .route("/api/labels", get(handlers::labels))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

impl ScoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            ScoreError::InputEmpty | ScoreError::UnknownLabel(_) | ScoreError::InvalidUpload(_) => {
                StatusCode::BAD_REQUEST
            }
            ScoreError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ScoreError::Decode(_) | ScoreError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ScoreError::Config(_) | ScoreError::ModelUnavailable(_) | ScoreError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ScoreError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
