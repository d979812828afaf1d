use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::api::status_for;
use crate::gateway::ToolMethod;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BlockQuery {
    #[serde(default)]
    pub include_transactions: bool,
}

// The handler function for the GET /block/{id} endpoint. The id may be a
// number, a block hash, or a tag such as 'latest'.
pub async fn get_block_handler(
    Path(id): Path<String>,
    Query(query): Query<BlockQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let args = json!({
        "block_identifier": &id,
        "include_transactions": query.include_transactions,
    });
    match state.gateway.handle(ToolMethod::GetBlock, &args).await {
        Ok(block) => (StatusCode::OK, Json(block)).into_response(),
        Err(e) => {
            error!("Failed to get block {}: {}", id, e);
            (
                status_for(&e),
                Json(json!({ "error": { "kind": e.kind().as_str(), "message": e.to_string() } })),
            )
                .into_response()
        }
    }
}
