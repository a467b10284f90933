use serde::Serialize;

/// Structured trace events emitted across the workspace's crates. Mirrors
/// the teacher's flat tagged-enum-plus-`.emit()` idiom, narrowed to the
/// events this system's components actually raise.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ConversationStateLoaded {
        conversation_id: String,
        message_index: u64,
        backend: &'static str,
    },
    ConversationStateCorrupted {
        conversation_id: String,
        key: &'static str,
    },
    ScenarioMapCompleted {
        scenario: String,
        blocks_emitted: usize,
        facts_emitted: usize,
    },
    ConditionDecided {
        scenario: String,
        block_id: String,
        decision: String,
    },
    ImperativesSummarized {
        scenario: String,
        imperative_count: usize,
        judge_rule_count: usize,
        used_fallback: bool,
    },
    JudgeRevised {
        conversation_id: String,
        attempt: u32,
        action: String,
    },
    SummaryUpdated {
        conversation_id: String,
        history_len: usize,
    },
    KeyRotationAdvanced {
        provider: String,
        counter: u64,
        key_count: usize,
    },
    RetrievalExhausted {
        attempts: u32,
    },
    SgrTraceWritten {
        trace_id: String,
        step: String,
    },
    LlmRequest {
        provider: String,
        model: String,
        role: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "trace_event");
    }
}
