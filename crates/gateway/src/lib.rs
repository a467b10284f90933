//! The gateway binary's library half: HTTP surface, turn pipelines, the
//! scenario engine and the SGR converter, wired together by [`bootstrap`]
//! into the [`state::AppState`] every handler shares.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod scenario_engine;
pub mod sgr;
pub mod state;
