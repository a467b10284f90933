//! `GET /health` and `GET /config`.

use axum::extract::State;
use axum::response::Json;

use crate::state::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "default_pipeline_version": state.config.pipeline.default_version.as_str(),
        "supported_pipeline_versions": ["0.1", "1.0"],
    }))
}
