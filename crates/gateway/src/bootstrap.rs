//! Builds a fully-wired [`AppState`] from [`Config`] — the shared boot path
//! for the `serve` and `doctor` CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use sa_contextpack::RetrievalClient;
use sa_domain::config::Config;
use sa_providers::OpenAiGateway;
use sa_skills::ScenarioRegistry;
use sa_tools::{GetUserData, ToolRegistry};

use crate::runtime::cancel::CancelMap;
use crate::runtime::session_lock::SessionLockMap;
use crate::state::AppState;

/// Validate config, initialize every component and return a fully-wired
/// [`AppState`]. Config errors are fatal; missing-but-optional dependencies
/// (no Redis, no API keys) degrade the relevant component rather than
/// refusing to start.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            sa_domain::config::ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            sa_domain::config::ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == sa_domain::config::ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == sa_domain::config::ConfigSeverity::Error).count()
        );
    }

    // ── Conversation memory ──────────────────────────────────────
    let memory = sa_memory::create_provider(&config.memory)
        .await
        .context("initializing conversation memory")?;
    tracing::info!("conversation memory ready");

    // ── Scenario registry, bootstrapped from disk ────────────────
    let scenarios = Arc::new(ScenarioRegistry::new());
    scenarios.load_default_from_disk(Path::new(&config.scenarios.storage_path));
    tracing::info!(count = scenarios.all().len(), "scenario registry ready");

    // ── Tool registry ─────────────────────────────────────────────
    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(GetUserData));
    tracing::info!(count = tools.specs().len(), "tool registry ready");

    // ── LLM gateway ───────────────────────────────────────────────
    let llm: Arc<dyn sa_providers::LlmGateway> = Arc::new(OpenAiGateway::new(
        config.llm.base_url.clone(),
        config.llm.api_keys.clone(),
        &config.memory.redis_url,
        config.llm.llm_model.clone(),
    ));
    tracing::info!(keys = config.llm.api_keys.len(), "LLM gateway ready");

    // ── Retrieval client ──────────────────────────────────────────
    let retrieval = Arc::new(RetrievalClient::new(config.retrieval.base_url.clone()));
    tracing::info!(base_url = %config.retrieval.base_url, "retrieval client ready");

    // ── Runtime config override reader ───────────────────────────
    let runtime_config = Arc::new(sa_providers::RuntimeConfigStore::new(&config.memory.redis_url));

    Ok(AppState {
        config,
        memory,
        scenarios,
        tools,
        llm,
        retrieval,
        runtime_config,
        conversation_locks: Arc::new(SessionLockMap::new()),
        cancel_map: Arc::new(CancelMap::new()),
    })
}
