//! `api` crate — HTTP boundary of the flow engine.
//!
//! Exposes:
//!   POST   /api/v1/execute                — run a workflow once (API mode)
//!   GET    /api/v1/executions/:workflow_id — read the execution-state snapshot
//!   POST   /webhook/:webhook_id            — publish to a webhook channel

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use storage::DataStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub data_store: DataStore,
}

pub fn router(data_store: DataStore) -> Router {
    let state = AppState { data_store };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_router = Router::new()
        .route("/execute", post(handlers::executions::execute))
        .route(
            "/executions/:workflow_id",
            get(handlers::executions::execution_state),
        );

    Router::new()
        .nest("/api/v1", api_router)
        .route("/webhook/:webhook_id", post(handlers::webhooks::trigger))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(bind: &str, data_store: DataStore) -> Result<(), std::io::Error> {
    let app = router(data_store);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await
}
