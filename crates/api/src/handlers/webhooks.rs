//! Webhook trigger endpoint for production workflows.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use crate::AppState;

/// POST /webhook/:webhook_id
///
/// Publishes the request body on the webhook channel. A webhook producer
/// blocked on `subscribe` for this id receives it; with no subscriber the
/// message is dropped (best-effort delivery).
pub async fn trigger(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    match state.data_store.webhooks().publish(&webhook_id, &body) {
        Ok(delivered) => {
            info!(%webhook_id, delivered, "webhook published");
            (
                StatusCode::OK,
                Json(json!({ "success": true, "delivered": delivered })),
            )
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": e.to_string() })),
        ),
    }
}
