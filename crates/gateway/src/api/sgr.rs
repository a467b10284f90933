//! `POST /sgr/convert` — natural language to `ScenarioDefinition`, via the
//! SGR converter's LLM chain, deterministic assembly and static validation.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::api::error::ApiError;
use crate::sgr::{self, SgrConvertRequest};
use crate::state::AppState;

pub async fn convert(State(state): State<AppState>, Json(body): Json<SgrConvertRequest>) -> impl IntoResponse {
    if body.text.trim().is_empty() {
        return ApiError(sa_domain::error::Error::InputValidation("text must not be empty".into())).into_response();
    }

    match sgr::convert(&state, body).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}
