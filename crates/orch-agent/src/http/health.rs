use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// Liveness probe: reports frontend/model port status alongside the
/// context store's cache occupancy and both queues' depth, so an
/// operator can see the whole pipeline at a glance.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let frontends: Vec<Value> = state
        .ports
        .frontend_statuses()
        .await
        .into_iter()
        .map(|(name, status)| json!({"name": name, "status": status}))
        .collect();
    let models: Vec<Value> = state
        .ports
        .model_statuses()
        .await
        .into_iter()
        .map(|(name, status)| json!({"name": name, "status": status}))
        .collect();
    let context_status = state.context.status().await;
    let queue_status = state.queue.status();

    Json(json!({
        "status": "ok",
        "frontends": frontends,
        "models": models,
        "context_store": context_status,
        "queues": queue_status,
    }))
}
