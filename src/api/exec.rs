//! Executor routes.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::state::ExecState;
use super::ApiError;
use crate::rpc::{ExecCmdRequest, ExecCmdResponse};

pub fn routes() -> Router<ExecState> {
    Router::new()
        .route("/exec-cmd", post(exec_cmd))
        .route("/health", get(health))
}

async fn exec_cmd(
    State(state): State<ExecState>,
    Json(req): Json<ExecCmdRequest>,
) -> Result<Json<ExecCmdResponse>, ApiError> {
    let outcome = state.service.exec_cmd(&req.cmd).await;
    if let Some(err) = outcome.error {
        return Err(err.into());
    }
    Ok(Json(ExecCmdResponse {
        std_out: outcome.stdout,
        std_err: outcome.stderr,
        exit_code: outcome.exit_code,
        err: None,
    }))
}

async fn health(State(state): State<ExecState>) -> Json<Value> {
    let forwarding = state
        .forwarder
        .as_ref()
        .map(|f| f.status())
        .unwrap_or_default();

    Json(json!({
        "status": "ok",
        "service": "exec",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "forwarding": forwarding,
    }))
}
