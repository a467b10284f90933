//! HTTP surface (C7's external face + C9's `/sgr/convert`): assembles every
//! route onto one `axum::Router<AppState>`.

pub mod chat;
pub mod error;
pub mod health;
pub mod history;
pub mod scenarios;
pub mod sgr;
pub mod tools;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full route table. `tower_http::trace::TraceLayer` is added by
/// the caller (`main.rs`), alongside CORS and any concurrency limiting —
/// this function only owns route-to-handler wiring.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/config", get(health::config))
        .route("/tools", get(tools::list_tools))
        .route("/chat", post(chat::chat))
        .route("/history", get(history::history))
        .route("/summary", get(history::summary))
        .route("/scenarios", get(scenarios::list).post(scenarios::create))
        .route(
            "/scenarios/:name",
            get(scenarios::get).delete(scenarios::delete).patch(scenarios::patch),
        )
        .route("/sgr/convert", post(sgr::convert))
        .with_state(state)
}
