//! History store routes.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::state::StoreState;
use super::ApiError;
use crate::rpc::{GetFromToRequest, HistoryResponse, StoreRequest, StoreResponse};

pub fn routes() -> Router<StoreState> {
    Router::new()
        .route("/store", post(store))
        .route("/get-from-to", post(get_from_to))
        .route("/history", get(history))
        .route("/health", get(health))
}

async fn store(
    State(state): State<StoreState>,
    Json(req): Json<StoreRequest>,
) -> Result<Json<StoreResponse>, ApiError> {
    state.service.store(req.into()).await?;
    Ok(Json(StoreResponse::default()))
}

async fn get_from_to(
    State(state): State<StoreState>,
    Json(req): Json<GetFromToRequest>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let res = state.service.get_from_to(req.from, req.to).await?;
    Ok(Json(HistoryResponse { res, err: None }))
}

async fn history(State(state): State<StoreState>) -> Result<Json<HistoryResponse>, ApiError> {
    let res = state.service.get_all().await?;
    Ok(Json(HistoryResponse { res, err: None }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "store",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
