//! Shared application state passed to every turn and every HTTP handler.

use std::sync::Arc;

use sa_contextpack::RetrievalClient;
use sa_domain::config::Config;
use sa_memory::ConversationMemory;
use sa_providers::{LlmGateway, RuntimeConfigStore};
use sa_skills::ScenarioRegistry;
use sa_tools::ToolRegistry;

use crate::runtime::cancel::CancelMap;
use crate::runtime::session_lock::SessionLockMap;

/// Shared application state — cloned (cheaply, via `Arc`) into every
/// request/turn. Conversation memory, the scenario registry, the tool
/// registry, the LLM gateway and the retrieval client are the long-lived
/// components; the scenario engine, turn pipeline, summarizer and SGR
/// converter are stateless functions over these.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub memory: Arc<dyn ConversationMemory>,
    pub scenarios: Arc<ScenarioRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub llm: Arc<dyn LlmGateway>,
    pub retrieval: Arc<RetrievalClient>,
    /// Live `runtime_config:v1` reader — lets `/chat`'s pipeline-version
    /// resolution (and anything else that needs a hot-reloadable override)
    /// see an operator's change without a process restart.
    pub runtime_config: Arc<RuntimeConfigStore>,

    /// Serializes turns per conversation so `message_index` and history
    /// order stay deterministic.
    pub conversation_locks: Arc<SessionLockMap>,
    /// Per-turn cancellation, propagated into in-flight LLM/retrieval calls.
    pub cancel_map: Arc<CancelMap>,
}
