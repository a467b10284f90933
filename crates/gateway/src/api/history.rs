//! `GET /history?conversation_id` and `GET /summary?conversation_id`.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    pub conversation_id: String,
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
) -> impl IntoResponse {
    match state.memory.get_history(&query.conversation_id, None).await {
        Ok(history) => {
            Json(serde_json::json!({"conversation_id": query.conversation_id, "history": history}))
                .into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
) -> impl IntoResponse {
    match state.memory.get_summary(&query.conversation_id).await {
        Ok(summary) => {
            Json(serde_json::json!({"conversation_id": query.conversation_id, "summary": summary})).into_response()
        }
        Err(e) => ApiError(e).into_response(),
    }
}
