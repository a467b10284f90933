//! `/scenarios[/{name}]` — Scenario Registry CRUD.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use sa_domain::model::ScenarioDefinition;

use crate::api::error::ApiError;
use crate::state::AppState;

pub async fn list(State(state): State<AppState>) -> Json<Vec<ScenarioDefinition>> {
    let mut scenarios: Vec<ScenarioDefinition> = state.scenarios.all().into_values().collect();
    scenarios.sort_by(|a, b| a.name.cmp(&b.name));
    Json(scenarios)
}

pub async fn get(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    match state.scenarios.get(&name) {
        Some(scenario) => Json(scenario).into_response(),
        None => ApiError(sa_domain::error::Error::InputValidation(format!("unknown scenario \"{name}\""))).into_response(),
    }
}

pub async fn create(State(state): State<AppState>, Json(scenario): Json<ScenarioDefinition>) -> impl IntoResponse {
    let name = scenario.name.clone();
    state.scenarios.add(scenario);
    (StatusCode::CREATED, Json(serde_json::json!({"name": name}))).into_response()
}

pub async fn delete(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    match state.scenarios.remove(&name) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => ApiError(sa_domain::error::Error::InputValidation(format!("unknown scenario \"{name}\""))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct PatchBody {
    pub enabled: Option<bool>,
}

pub async fn patch(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<PatchBody>,
) -> impl IntoResponse {
    let Some(mut scenario) = state.scenarios.get(&name) else {
        return ApiError(sa_domain::error::Error::InputValidation(format!("unknown scenario \"{name}\""))).into_response();
    };
    if let Some(enabled) = body.enabled {
        scenario.enabled = enabled;
    }
    state.scenarios.add(scenario.clone());
    Json(scenario).into_response()
}
