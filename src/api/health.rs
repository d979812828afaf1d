use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "evm-gateway-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "chain_id": state.config.chain_id,
        "endpoints": state.config.endpoints.len(),
    }))
}
