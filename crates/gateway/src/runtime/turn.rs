//! Turn Pipeline v1.0 (C7): the fixed DAG with one bounded loop
//! (`judge_evaluate` ↔ `judge_revise`, at most two revisions) that turns one
//! user message into one persisted assistant answer.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use sa_domain::error::Result;
use sa_domain::model::{BlockKind, BlockTarget, Chunk, HistoryItem, JudgeAction, JudgeDecision, MessageRole};
use sa_providers::{ChatMessage, LlmGateway, ModelRole};

use crate::runtime::apology::apology_for;
use crate::runtime::cancel::CancelToken;
use crate::runtime::summarizer;
use crate::scenario_engine::run_scenario_engine;
use crate::state::AppState;

const MAX_JUDGE_ATTEMPTS: u32 = 2;
const DIALOG_TAIL_LEN: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutput {
    pub conversation_id: String,
    pub answer: String,
    pub chunks: Vec<Chunk>,
    pub last_step_scenario: String,
}

/// Run one turn end to end: `load_state → append_user → retrieval →
/// scenario_engine → build_messages → llm_generate → judge_evaluate
/// (↔ judge_revise, capped) → persist_answer → launch_summary`.
pub async fn run_turn_v1_0(
    state: &AppState,
    conversation_id: &str,
    user_message: &str,
    cancel: &CancelToken,
) -> Result<TurnOutput> {
    // ── load_state ──────────────────────────────────────────────────────
    let mut conv_state = state.memory.get_state(conversation_id).await?;

    // ── append_user ─────────────────────────────────────────────────────
    conv_state.message_index += 1;
    state
        .memory
        .append_history(conversation_id, HistoryItem::new(MessageRole::User, user_message))
        .await?;
    conv_state.summary = state.memory.get_summary(conversation_id).await.unwrap_or_default();

    if cancel.is_cancelled() {
        return Err(sa_domain::error::Error::Other("turn cancelled".into()));
    }

    // ── retrieval ───────────────────────────────────────────────────────
    let chunks = state.retrieval.search(user_message).await;

    // ── scenario_engine ─────────────────────────────────────────────────
    let scenarios = state.scenarios.all();
    let tools_context =
        run_scenario_engine(&scenarios, &conv_state, user_message, &state.tools, &state.llm).await;
    backfill_profile_from_tool_facts(&mut conv_state, &tools_context);

    let history = state.memory.get_history(conversation_id, None).await?;

    // ── build_messages ──────────────────────────────────────────────────
    let system_prompt = build_system_prompt(&conv_state, &history, &chunks, &tools_context);
    let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(user_message)];

    // ── llm_generate ────────────────────────────────────────────────────
    // A generation failure degrades to a categorized apology (§7) rather
    // than failing the turn outright; the judge/revise loop below is then
    // skipped since there is nothing of substance to critique.
    let mut answer = match state.llm.chat(&messages, 0.1, ModelRole::Generate, None).await {
        Ok(text) => text,
        Err(e) => {
            let apology = apology_for(&e);
            state
                .memory
                .append_history(conversation_id, HistoryItem::new(MessageRole::Assistant, apology.clone()))
                .await?;
            state.memory.save_state(&conv_state).await?;
            summarizer::launch_summary(state.clone(), conversation_id.to_string());
            return Ok(TurnOutput {
                conversation_id: conversation_id.to_string(),
                answer: apology,
                chunks,
                last_step_scenario: String::new(),
            });
        }
    };

    // ── judge_evaluate ↔ judge_revise (bounded loop) ────────────────────
    // A judge or revise failure short-circuits straight to persisting the
    // current draft (§7: "Judge/revise failure short-circuits to persist
    // of the current draft") instead of propagating and failing the turn.
    let mut judge_attempts: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(sa_domain::error::Error::Other("turn cancelled".into()));
        }

        let decision = match judge_evaluate(state, &answer, &conv_state, &chunks, &tools_context).await {
            Ok(d) => d,
            Err(_) => break,
        };
        if decision.action == JudgeAction::Pass || judge_attempts >= MAX_JUDGE_ATTEMPTS {
            break;
        }

        match judge_revise(state, &answer, &decision, &conv_state, &chunks, &tools_context).await {
            Ok(revised) => answer = revised,
            Err(_) => break,
        }
        judge_attempts += 1;
        sa_domain::trace::TraceEvent::JudgeRevised {
            conversation_id: conversation_id.to_string(),
            attempt: judge_attempts,
            action: "revise".to_string(),
        }
        .emit();
    }

    // ── persist_answer ──────────────────────────────────────────────────
    state
        .memory
        .append_history(conversation_id, HistoryItem::new(MessageRole::Assistant, answer.clone()))
        .await?;
    let now = chrono::Utc::now();
    conv_state.scenario_runs.extend(tools_context.applied.iter().map(|entry| sa_domain::model::ScenarioRun {
        name: entry.name.clone(),
        at_message_index: conv_state.message_index,
        ts: now,
    }));
    state.memory.save_state(&conv_state).await?;

    // ── launch_summary ──────────────────────────────────────────────────
    summarizer::launch_summary(state.clone(), conversation_id.to_string());

    let last_step_scenario = tools_context
        .applied
        .iter()
        .map(|e| e.name.as_str())
        .collect::<Vec<_>>()
        .join(",");

    Ok(TurnOutput { conversation_id: conversation_id.to_string(), answer, chunks, last_step_scenario })
}

/// `get_user_data`'s facts backfill the profile the first time it is
/// populated (§4.6.2): `name` verbatim, `age` only if integer-coercible.
/// A profile already populated was the source of the fact in the first
/// place (map's `resolve_tool` synthesizes from it), so this is a no-op
/// on every later turn.
fn backfill_profile_from_tool_facts(
    conv_state: &mut sa_domain::model::ConversationState,
    tools_context: &sa_domain::model::ToolsContext,
) {
    let Some(fact) = tools_context.facts.get("tool:get_user_data") else { return };
    if conv_state.user_profile.name.is_none() {
        if let Some(name) = fact.get("name").and_then(|v| v.as_str()) {
            conv_state.user_profile.name = Some(name.to_string());
        }
    }
    if conv_state.user_profile.age.is_none() {
        if let Some(age) = fact.get("age").and_then(|v| v.as_i64()) {
            conv_state.user_profile.age = Some(age);
        }
    }
}

fn build_system_prompt(
    state: &sa_domain::model::ConversationState,
    history: &[HistoryItem],
    chunks: &[Chunk],
    tools_context: &sa_domain::model::ToolsContext,
) -> String {
    let mut out = String::new();
    out.push_str(
        "Ты ассистент поддержки. Отвечай по существу, без эмодзи и без обещаний, \
         которые не подтверждены контекстом ниже. Порядок значимости источников: \
         context > tools_context > dialog_summary/dialog_tail.\n\n",
    );

    out.push_str(&format!("dialog_params.message_index: {}\n\n", state.message_index));

    if !state.summary.is_empty() {
        out.push_str("dialog_summary:\n");
        out.push_str(&state.summary);
        out.push_str("\n\n");
    }

    let tail = dialog_tail(history);
    if !tail.is_empty() {
        out.push_str("dialog_tail:\n");
        for item in &tail {
            out.push_str(&format!("- {:?}: {}\n", item.role, item.content));
        }
        out.push('\n');
    }

    out.push_str("context:\n");
    if chunks.is_empty() {
        out.push_str("(в базе знаний ничего не найдено)\n\n");
    } else {
        for (i, chunk) in chunks.iter().enumerate() {
            out.push_str(&format!("[{}] {}\n", i + 1, chunk.text));
        }
        out.push('\n');
    }

    let mut required: Vec<_> = tools_context
        .instruction_blocks
        .iter()
        .filter(|b| b.target == BlockTarget::Agent && b.kind == BlockKind::Required)
        .collect();
    required.sort_by_key(|b| b.priority);

    let mut conditional: Vec<_> = tools_context
        .instruction_blocks
        .iter()
        .filter(|b| b.target == BlockTarget::Agent && b.kind == BlockKind::Conditional)
        .collect();
    conditional.sort_by_key(|b| b.priority);

    let mut raw: Vec<_> = tools_context
        .instruction_blocks
        .iter()
        .filter(|b| b.target == BlockTarget::Agent && b.kind == BlockKind::Raw)
        .collect();
    raw.sort_by_key(|b| b.priority);

    if !required.is_empty() || !raw.is_empty() {
        out.push_str("tools_context.required_blocks:\n");
        for block in required.iter().chain(raw.iter()) {
            if let Some(text) = &block.text {
                out.push_str(&format!("- {text}\n"));
            }
        }
        out.push('\n');
    }

    if !conditional.is_empty() {
        out.push_str("tools_context.conditional_blocks:\n");
        for block in &conditional {
            if let Some(payload) = &block.payload {
                out.push_str(&format!(
                    "- condition: {}\n  {}\n  {}\n  {}\n  {}\n",
                    payload.condition,
                    payload.apply_policy.relevance_gate,
                    payload.apply_policy.true_gate,
                    payload.apply_policy.false_gate,
                    payload.apply_policy.unknown_gate,
                ));
            }
        }
        out.push('\n');
    }

    out
}

/// Last `DIALOG_TAIL_LEN` items, excluding the trailing duplicate of the
/// current user message already appended by `append_user`.
fn dialog_tail(history: &[HistoryItem]) -> Vec<HistoryItem> {
    let without_current = if history.len() > 1 { &history[..history.len() - 1] } else { &[] };
    let start = without_current.len().saturating_sub(DIALOG_TAIL_LEN);
    without_current[start..].to_vec()
}

fn judge_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "action": {"type": "string", "enum": ["pass", "revise"]},
            "reasons": {"type": "array", "items": {"type": "string"}},
            "patch_instructions": {"type": "string"},
        },
        "required": ["action", "reasons", "patch_instructions"],
        "additionalProperties": false,
    })
}

async fn judge_evaluate(
    state: &AppState,
    answer: &str,
    conv_state: &sa_domain::model::ConversationState,
    chunks: &[Chunk],
    tools_context: &sa_domain::model::ToolsContext,
) -> Result<JudgeDecision> {
    let mut system = String::from(
        "Ты строгий редактор-судья. Проверь черновик ответа против правил ниже и реши: \
         pass, если всё в порядке, или revise, если нужна 1-2 точечные правки. \
         Запрещены эмодзи и обещания, не подтверждённые контекстом.\n\n",
    );

    for block in tools_context
        .instruction_blocks
        .iter()
        .filter(|b| b.target == BlockTarget::Judge && b.kind == BlockKind::Rule)
    {
        if let Some(text) = &block.text {
            system.push_str(&format!("rule: {text}\n"));
        }
    }

    system.push_str(&format!(
        "\nfacts: profile.name={:?}, profile.age={:?}\n",
        conv_state.user_profile.name, conv_state.user_profile.age
    ));

    let required_texts: Vec<&str> = tools_context
        .instruction_blocks
        .iter()
        .filter(|b| b.target == BlockTarget::Agent && b.kind == BlockKind::Required)
        .filter_map(|b| b.text.as_deref())
        .collect();
    if !required_texts.is_empty() {
        system.push_str("\nrequired_agent_texts:\n");
        for text in required_texts {
            system.push_str(&format!("- {text}\n"));
        }
    }

    system.push_str("\ncontext:\n");
    for chunk in chunks {
        system.push_str(&format!("- {}\n", chunk.text));
    }

    let messages = vec![ChatMessage::system(system), ChatMessage::user(answer.to_string())];

    let value = state
        .llm
        .chat_json(
            &messages,
            &judge_schema(),
            "judge_decision",
            0.0,
            ModelRole::Judge,
            Some(state.config.llm.judge_model()),
        )
        .await?;

    Ok(serde_json::from_value(value).unwrap_or(JudgeDecision {
        action: JudgeAction::Pass,
        reasons: Vec::new(),
        patch_instructions: String::new(),
    }))
}

async fn judge_revise(
    state: &AppState,
    answer: &str,
    decision: &JudgeDecision,
    conv_state: &sa_domain::model::ConversationState,
    chunks: &[Chunk],
    tools_context: &sa_domain::model::ToolsContext,
) -> Result<String> {
    let system = "Внеси минимальные правки. Не добавляй фактов, не подтверждённых контекстом. \
                  Сохрани обязательные пункты, если они не противоречат контексту. \
                  Убери эмодзи и необоснованные обещания."
        .to_string();

    let must_keep: Vec<&str> = tools_context
        .instruction_blocks
        .iter()
        .filter(|b| b.target == BlockTarget::Agent && b.kind == BlockKind::Required)
        .filter_map(|b| b.text.as_deref())
        .collect();

    let mut user = String::new();
    user.push_str(&format!("patch_instructions: {}\n\n", decision.patch_instructions));
    user.push_str(&format!("original_answer:\n{answer}\n\n"));
    user.push_str(&format!(
        "facts: profile.name={:?}, profile.age={:?}\n\n",
        conv_state.user_profile.name, conv_state.user_profile.age
    ));
    if !must_keep.is_empty() {
        user.push_str("must_keep:\n");
        for text in &must_keep {
            user.push_str(&format!("- {text}\n"));
        }
        user.push('\n');
    }
    user.push_str("context:\n");
    for chunk in chunks {
        user.push_str(&format!("- {}\n", chunk.text));
    }

    let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
    state.llm.chat(&messages, 0.1, ModelRole::Revise, Some(state.config.llm.revise_model())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::{ConversationState, HistoryItem, MessageRole};

    #[test]
    fn dialog_tail_excludes_trailing_current_message_and_caps_length() {
        let history: Vec<HistoryItem> = (0..6)
            .map(|i| HistoryItem::new(MessageRole::User, format!("m{i}")))
            .collect();
        let tail = dialog_tail(&history);
        assert_eq!(tail.len(), 4);
        assert_eq!(tail.last().unwrap().content, "m4");
    }

    #[test]
    fn dialog_tail_empty_when_only_current_message() {
        let history = vec![HistoryItem::new(MessageRole::User, "hi")];
        assert!(dialog_tail(&history).is_empty());
    }

    #[test]
    fn build_system_prompt_notes_missing_context() {
        let state = ConversationState::new("c1");
        let prompt = build_system_prompt(&state, &[], &[], &sa_domain::model::ToolsContext::default());
        assert!(prompt.contains("ничего не найдено"));
    }

    #[test]
    fn backfill_populates_empty_profile_from_tool_fact() {
        let mut state = ConversationState::new("c1");
        let mut tools_context = sa_domain::model::ToolsContext::default();
        tools_context.facts.insert(
            "tool:get_user_data".to_string(),
            serde_json::json!({"name": "Иван", "age": 30}),
        );
        backfill_profile_from_tool_facts(&mut state, &tools_context);
        assert_eq!(state.user_profile.name.as_deref(), Some("Иван"));
        assert_eq!(state.user_profile.age, Some(30));
    }

    #[test]
    fn backfill_does_not_overwrite_existing_profile() {
        let mut state = ConversationState::new("c1");
        state.user_profile.name = Some("Ольга".to_string());
        let mut tools_context = sa_domain::model::ToolsContext::default();
        tools_context.facts.insert(
            "tool:get_user_data".to_string(),
            serde_json::json!({"name": "Иван", "age": 30}),
        );
        backfill_profile_from_tool_facts(&mut state, &tools_context);
        assert_eq!(state.user_profile.name.as_deref(), Some("Ольга"));
    }
}
