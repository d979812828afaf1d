use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::error;

use crate::api::status_for;
use crate::gateway::ToolMethod;
use crate::AppState;

// The handler function for the GET /account/{address} endpoint.
pub async fn get_account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let args = json!({ "address": &address });
    match state.gateway.handle(ToolMethod::GetAccount, &args).await {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(e) => {
            error!("Failed to get account {}: {}", address, e);
            (
                status_for(&e),
                Json(json!({ "error": { "kind": e.kind().as_str(), "message": e.to_string() } })),
            )
                .into_response()
        }
    }
}
