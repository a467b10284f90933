//! `POST /chat` — runs one turn through whichever pipeline version the
//! request resolves to, serialized per `conversation_id`.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use sa_domain::config::PipelineVersion;

use crate::api::error::ApiError;
use crate::runtime::{run_turn_v0_1, run_turn_v1_0};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: String,
    pub message: String,
}

const PIPELINE_VERSION_HEADER: &str = "x-agent-pipeline-version";

/// Explicit header wins when recognized; else a live `runtime_config:v1`
/// `AGENT_PIPELINE_VERSION` override; else the configured process
/// default; else `"0.1"`.
async fn resolve_pipeline_version(headers: &HeaderMap, state: &AppState) -> PipelineVersion {
    if let Some(version) = headers
        .get(PIPELINE_VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(PipelineVersion::parse)
    {
        return version;
    }
    if let Some(version) = state
        .runtime_config
        .get_field("AGENT_PIPELINE_VERSION")
        .await
        .as_deref()
        .and_then(PipelineVersion::parse)
    {
        return version;
    }
    state.config.pipeline.default_version
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    if body.conversation_id.trim().is_empty() || body.message.trim().is_empty() {
        return ApiError(sa_domain::error::Error::InputValidation(
            "conversation_id and message must not be empty".into(),
        ))
        .into_response();
    }

    let version = resolve_pipeline_version(&headers, &state).await;
    let cancel = state.cancel_map.register(&body.conversation_id);

    let _permit = match state.conversation_locks.acquire(&body.conversation_id).await {
        Ok(permit) => permit,
        Err(_busy) => {
            return ApiError(sa_domain::error::Error::Other(
                "a turn is already running for this conversation".into(),
            ))
            .into_response();
        }
    };

    let result = match version {
        PipelineVersion::V1_0 => run_turn_v1_0(&state, &body.conversation_id, &body.message, &cancel).await,
        PipelineVersion::V0_1 => run_turn_v0_1(&state, &body.conversation_id, &body.message, &cancel).await,
    };
    state.cancel_map.remove(&body.conversation_id);

    match result {
        Ok(output) => Json(output).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}
