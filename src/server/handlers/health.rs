use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "initialized": state.guide.is_ready(),
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let guide = &state.guide;
    let generation = guide.generation();
    let reachable = generation.provider().health_check().await.unwrap_or(false);
    Json(json!({
        "index": guide.status(),
        "banner": guide.banner(),
        "llm": {
            "provider": generation.provider().name(),
            "model": generation.model(),
            "reachable": reachable,
        },
        "embedding_model": guide.embedding_model(),
        "started_at": state.started_at.to_rfc3339(),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds().max(0),
    }))
}
