//! `GET /tools` — the Tool Registry's specs, for operators and for the SGR
//! converter's own use when matching author intents to known tools.

use axum::extract::State;
use axum::response::Json;

use crate::state::AppState;

pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<sa_domain::model::ToolSpec>> {
    Json(state.tools.specs())
}
