//! Execute a workflow once and return its response.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use engine::{api_response_parts, EngineError, FlowEngine, WorkflowDefinition};
use nodes::DataMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub workflow: WorkflowDefinition,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub input: DataMap,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// POST /api/v1/execute
///
/// Loads the posted workflow, runs it once in API mode with the request's
/// context attached, and maps the last node's output onto the HTTP
/// response (honoring the reserved response shape).
pub async fn execute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query_params): Query<HashMap<String, String>>,
    Json(request): Json<ExecuteRequest>,
) -> (StatusCode, Json<Value>) {
    let mut flow_engine = FlowEngine::with_parts(
        request.workflow_id.clone(),
        nodes::NodeRegistry::builtin(),
        state.data_store.clone(),
    );
    if let Err(e) = flow_engine.load_workflow(request.workflow, None) {
        return error_response(StatusCode::BAD_REQUEST, &e);
    }

    let header_map: serde_json::Map<String, Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), json!(v)))
        })
        .collect();
    let request_context = json!({
        "headers": header_map,
        "query_params": query_params,
        "method": "POST",
    });

    let timeout = request.timeout_seconds.map(Duration::from_secs);
    match flow_engine
        .run_api(request.input, timeout, Some(request_context))
        .await
    {
        Ok(output) => {
            let (status, body) = api_response_parts(&output);
            let status =
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(body))
        }
        Err(e @ EngineError::Timeout(_)) => error_response(StatusCode::GATEWAY_TIMEOUT, &e),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e),
    }
}

/// GET /api/v1/executions/:workflow_id
///
/// Reads the cross-process execution-state snapshot from the cache.
pub async fn execution_state(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match engine::snapshot::read_snapshot(state.data_store.cache(), &workflow_id) {
        Ok(Some(snapshot)) => (StatusCode::OK, Json(snapshot)),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "no execution state" })),
        ),
        Err(e) => {
            error!(%workflow_id, error = %e, "failed to read execution state");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}

fn error_response(status: StatusCode, error: &EngineError) -> (StatusCode, Json<Value>) {
    error!(%error, "workflow execution request failed");
    (
        status,
        Json(json!({ "success": false, "error": error.to_string() })),
    )
}
