//! API layer -- axum routers for the executor and the history store.

mod exec;
pub mod state;
mod store;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use self::state::{ExecState, StoreState};
use crate::config::StoreConfig;
use crate::exec::ExecError;
use crate::history::StoreError;
use crate::rpc::ErrorResponse;

/// Routes of the executor service.
pub fn exec_router(state: ExecState) -> Router {
    exec::routes()
        .fallback(fallback)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Routes of the history store service. Request bodies are capped at
/// `config.max_body_bytes` rather than axum's 2 MB default, since a record
/// holds a command's whole output.
pub fn store_router(state: StoreState, config: &StoreConfig) -> Router {
    let body_limit = match config.body_limit() {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };
    store::routes()
        .fallback(fallback)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(body_limit),
        )
        .with_state(state)
}

async fn fallback() -> ApiError {
    ApiError::NotFound
}

/// A failed request, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("not found")]
    NotFound,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Exec(ExecError::InvalidCommand) => StatusCode::BAD_REQUEST,
            ApiError::Exec(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Store(StoreError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
